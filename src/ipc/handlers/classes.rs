//! Class configuration: list with resolved teacher names and student counts,
//! plus create/update/delete. Deleting a class never cascades; student
//! references are left dangling by design.

use serde_json::{json, Value};

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, new_id, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::SchoolClass;
use crate::store::{Collection, Store};

fn parse_subjects_param(v: &Value) -> Result<Option<Vec<String>>, HandlerErr> {
    if v.is_null() {
        return Ok(None);
    }
    let items = v
        .as_array()
        .ok_or_else(|| HandlerErr::bad_params("subjects must be an array or null"))?;
    let mut subjects = Vec::with_capacity(items.len());
    for item in items {
        let s = item
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| HandlerErr::bad_params("subjects entries must be strings"))?;
        if s.is_empty() {
            return Err(HandlerErr::bad_params("subjects entries must not be empty"));
        }
        subjects.push(s);
    }
    if subjects.is_empty() {
        return Ok(None);
    }
    Ok(Some(subjects))
}

fn class_row(store: &Store, class: &SchoolClass) -> Value {
    let teacher_name = class
        .teacher_id
        .as_deref()
        .and_then(|tid| store.state.find_teacher(tid))
        .map(|t| t.name.clone());
    let student_count = store.state.students_in_class(&class.id).len();
    json!({
        "id": class.id,
        "name": class.name,
        "teacherId": class.teacher_id,
        "teacherName": teacher_name,
        "studentCount": student_count,
        "subjects": store.state.class_subjects(class),
        "hasSubjectOverride": class.subjects.is_some(),
    })
}

fn classes_list(store: &Store) -> Result<Value, HandlerErr> {
    let rows: Vec<Value> = store
        .state
        .classes
        .iter()
        .map(|c| class_row(store, c))
        .collect();
    Ok(json!({ "classes": rows }))
}

fn classes_create(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let teacher_id = get_optional_str(params, "teacherId")?;
    let subjects = match params.get("subjects") {
        Some(v) => parse_subjects_param(v)?,
        None => None,
    };

    let class = SchoolClass {
        id: new_id(),
        name,
        teacher_id,
        subjects,
    };
    let row = class_row(store, &class);
    let class_id = class.id.clone();
    store.state.classes.push(class);
    store.persist(Collection::Classes);

    Ok(json!({ "classId": class_id, "class": row }))
}

fn classes_update(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    if !store.state.classes.iter().any(|c| c.id == class_id) {
        return Err(HandlerErr::not_found("class not found"));
    }

    let mut name = None;
    let mut teacher_id = None;
    let mut subjects = None;
    for (k, v) in patch {
        match k.as_str() {
            "name" => {
                let s = v
                    .as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| HandlerErr::bad_params("name must be string"))?;
                if s.is_empty() {
                    return Err(HandlerErr::bad_params("name must not be empty"));
                }
                name = Some(s);
            }
            "teacherId" => {
                teacher_id = Some(if v.is_null() {
                    None
                } else {
                    Some(
                        v.as_str()
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .ok_or_else(|| {
                                HandlerErr::bad_params("teacherId must be string or null")
                            })?,
                    )
                });
            }
            "subjects" => subjects = Some(parse_subjects_param(v)?),
            _ => return Err(HandlerErr::bad_params(format!("unknown class field: {}", k))),
        }
    }

    let class = store
        .state
        .classes
        .iter_mut()
        .find(|c| c.id == class_id)
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    if let Some(n) = name {
        class.name = n;
    }
    if let Some(t) = teacher_id {
        class.teacher_id = t;
    }
    if let Some(s) = subjects {
        class.subjects = s;
    }
    let updated = class.clone();
    store.persist(Collection::Classes);

    Ok(json!({ "class": class_row(store, &updated) }))
}

fn classes_delete(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let before = store.state.classes.len();
    store.state.classes.retain(|c| c.id != class_id);
    if store.state.classes.len() == before {
        return Err(HandlerErr::not_found("class not found"));
    }
    store.persist(Collection::Classes);
    Ok(json!({ "deleted": true }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match classes_list(store) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match classes_create(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match classes_update(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match classes_delete(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_list(state, req)),
        "classes.create" => Some(handle_create(state, req)),
        "classes.update" => Some(handle_update(state, req)),
        "classes.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
