//! The school-identity singleton: `settings.get` / `settings.update`.
//! Updates are a validated field-wise merge; changing the current session or
//! term re-scopes every period-gated read.

use serde_json::{json, Map, Value};

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{parse_date, parse_session, parse_term, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::Settings;
use crate::store::{Collection, Store};

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, HandlerErr> {
    let s = v
        .as_str()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string", key)))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(HandlerErr::bad_params(format!(
            "{} length must be <= {}",
            key, max_len
        )));
    }
    Ok(s.to_string())
}

fn parse_nullable_string(v: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    if v.is_null() {
        return Ok(None);
    }
    let s = v
        .as_str()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key)))?;
    Ok(Some(s.to_string()))
}

fn parse_subject_list(v: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let items = v
        .as_array()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array", key)))?;
    let mut subjects: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let s = item
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| HandlerErr::bad_params(format!("{} entries must be strings", key)))?;
        if s.is_empty() {
            return Err(HandlerErr::bad_params(format!(
                "{} entries must not be empty",
                key
            )));
        }
        if subjects.iter().any(|existing| existing == &s) {
            return Err(HandlerErr::bad_params_with(
                format!("{} entries must be unique", key),
                json!({ "duplicate": s }),
            ));
        }
        subjects.push(s);
    }
    if subjects.is_empty() {
        return Err(HandlerErr::bad_params(format!(
            "{} must not be empty",
            key
        )));
    }
    Ok(subjects)
}

fn merge_settings_patch(current: &mut Settings, patch: &Map<String, Value>) -> Result<(), HandlerErr> {
    for (k, v) in patch {
        match k.as_str() {
            "schoolName" => current.school_name = parse_string_max(v, k, 200)?,
            "address" => current.address = parse_string_max(v, k, 400)?,
            "phone" => current.phone = parse_string_max(v, k, 40)?,
            "email" => current.email = parse_string_max(v, k, 200)?,
            "motto" => current.motto = parse_string_max(v, k, 200)?,
            "currentSession" => {
                current.current_session = parse_session(&parse_string_max(v, k, 16)?)?;
            }
            "currentTerm" => {
                current.current_term = parse_term(&parse_string_max(v, k, 24)?)?;
            }
            "nextTermBegins" => {
                current.next_term_begins = match parse_nullable_string(v, k)? {
                    Some(s) => Some(parse_date(s.trim(), k)?),
                    None => None,
                };
            }
            "logo" => current.logo = parse_nullable_string(v, k)?,
            "principalSignature" => current.principal_signature = parse_nullable_string(v, k)?,
            "subjects" => current.subjects = parse_subject_list(v, k)?,
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown settings field: {}",
                    k
                )))
            }
        }
    }
    Ok(())
}

fn settings_get(store: &Store) -> Result<Value, HandlerErr> {
    let settings = serde_json::to_value(&store.state.settings)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    Ok(json!({ "settings": settings }))
}

fn settings_update(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    // Validate against a copy so a rejected patch leaves nothing behind.
    let mut next = store.state.settings.clone();
    merge_settings_patch(&mut next, patch)?;
    store.state.settings = next;
    store.persist(Collection::Settings);

    settings_get(store)
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match settings_get(store) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match settings_update(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
