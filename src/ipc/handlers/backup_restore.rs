//! `backup.export` / `backup.import`: the single-JSON-document backup.
//! Import replaces the entire state and immediately persists all ten
//! collections; there is no merge mode.

use std::path::PathBuf;

use serde_json::json;
use tracing::info;

use crate::backup::{self, ImportError};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;

fn backup_export(store: &Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let out_path = PathBuf::from(get_required_str(params, "outPath")?);
    let summary = backup::export_state(&store.state, &out_path).map_err(|e| HandlerErr {
        code: "io_failed",
        message: e.to_string(),
        details: Some(json!({ "path": out_path.to_string_lossy() })),
    })?;
    info!(path = %out_path.to_string_lossy(), "backup exported");
    Ok(json!({
        "format": summary.format,
        "checksum": summary.checksum,
        "counts": summary.counts,
        "path": out_path.to_string_lossy(),
    }))
}

fn backup_import(store: &mut Store, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let in_path = PathBuf::from(get_required_str(params, "inPath")?);
    let summary = backup::import_state(&in_path).map_err(|e| {
        let code = match &e {
            ImportError::Io(_) => "io_failed",
            ImportError::Parse(_) => "backup_parse_failed",
            ImportError::Shape(_) => "backup_shape_invalid",
        };
        HandlerErr {
            code,
            message: e.to_string(),
            details: Some(json!({ "path": in_path.to_string_lossy() })),
        }
    })?;
    store.replace_state(summary.state);
    info!(path = %in_path.to_string_lossy(), "backup imported");
    Ok(json!({ "imported": true, "counts": summary.counts }))
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match backup_export(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match backup_import(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_export(state, req)),
        "backup.import" => Some(handle_import(state, req)),
        _ => None,
    }
}
