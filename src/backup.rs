//! Whole-database backup as one JSON document: the ten collections as
//! top-level keys plus advisory metadata. Import validates only that the
//! `settings` and `students` keys are present; everything else is accepted
//! as-is, with malformed elements falling back to defaults.

use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::model::{
    AttendanceRecord, Expense, Fee, Payment, SchoolClass, SchoolState, ScoreSheet, Settings,
    StaffMember, Student, Teacher,
};
use crate::store::Collection;

pub const BACKUP_FORMAT_V1: &str = "schoolbook-backup-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub format: String,
    pub checksum: String,
    pub counts: Value,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub state: SchoolState,
    pub counts: Value,
}

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Shape(&'static str),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Io(e) => write!(f, "failed to read backup file: {}", e),
            ImportError::Parse(e) => write!(f, "backup is not valid JSON: {}", e),
            ImportError::Shape(msg) => write!(f, "backup shape invalid: {}", msg),
        }
    }
}

/// Per-collection record counts; settings reports 1, it is a singleton.
pub fn collection_counts(state: &SchoolState) -> Value {
    json!({
        "settings": 1,
        "students": state.students.len(),
        "teachers": state.teachers.len(),
        "staff": state.staff.len(),
        "classes": state.classes.len(),
        "fees": state.fees.len(),
        "payments": state.payments.len(),
        "expenses": state.expenses.len(),
        "scores": state.scores.len(),
        "attendance": state.attendance.len(),
    })
}

/// SHA-256 hex over the ten collection values serialized as an array in key
/// order. `serde_json::Map` sorts object keys, so export and re-parse
/// canonicalize identically.
fn checksum_of(collections: &[Value]) -> String {
    let canonical = serde_json::to_string(collections).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn collection_values(state: &SchoolState) -> anyhow::Result<Vec<Value>> {
    Ok(vec![
        serde_json::to_value(&state.settings)?,
        serde_json::to_value(&state.students)?,
        serde_json::to_value(&state.teachers)?,
        serde_json::to_value(&state.staff)?,
        serde_json::to_value(&state.classes)?,
        serde_json::to_value(&state.fees)?,
        serde_json::to_value(&state.payments)?,
        serde_json::to_value(&state.expenses)?,
        serde_json::to_value(&state.scores)?,
        serde_json::to_value(&state.attendance)?,
    ])
}

pub fn export_state(state: &SchoolState, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let values = collection_values(state)?;
    let checksum = checksum_of(&values);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut doc = json!({
        "format": BACKUP_FORMAT_V1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "checksum": checksum,
    });
    for (collection, value) in Collection::ALL.iter().zip(values) {
        doc[collection.key()] = value;
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let text = serde_json::to_string_pretty(&doc).context("failed to serialize backup")?;
    std::fs::write(out_path, text)
        .with_context(|| format!("failed to write backup {}", out_path.to_string_lossy()))?;

    Ok(ExportSummary {
        format: BACKUP_FORMAT_V1.to_string(),
        checksum,
        counts: collection_counts(state),
    })
}

pub fn import_state(in_path: &Path) -> Result<ImportSummary, ImportError> {
    let text = std::fs::read_to_string(in_path).map_err(ImportError::Io)?;
    let doc: Value = serde_json::from_str(&text).map_err(ImportError::Parse)?;
    let state = decode_backup(&doc)?;
    let counts = collection_counts(&state);
    Ok(ImportSummary { state, counts })
}

/// The shape check is only top-level key presence, matching the origin app.
/// Everything past it decodes best-effort: a malformed record becomes the
/// default with a warning, unknown keys are ignored, and a checksum mismatch
/// warns without rejecting (hand-edited backups are accepted on purpose).
pub fn decode_backup(doc: &Value) -> Result<SchoolState, ImportError> {
    if !doc.is_object() {
        return Err(ImportError::Shape("top level must be an object"));
    }
    if doc.get("settings").is_none() {
        return Err(ImportError::Shape("missing settings key"));
    }
    if doc.get("students").is_none() {
        return Err(ImportError::Shape("missing students key"));
    }

    let settings = match serde_json::from_value::<Settings>(doc["settings"].clone()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "backup settings are malformed, using defaults");
            Settings::default()
        }
    };

    let state = SchoolState {
        settings,
        students: decode_rows::<Student>(doc, "students"),
        teachers: decode_rows::<Teacher>(doc, "teachers"),
        staff: decode_rows::<StaffMember>(doc, "staff"),
        classes: decode_rows::<SchoolClass>(doc, "classes"),
        fees: decode_rows::<Fee>(doc, "fees"),
        payments: decode_rows::<Payment>(doc, "payments"),
        expenses: decode_rows::<Expense>(doc, "expenses"),
        scores: decode_rows::<ScoreSheet>(doc, "scores"),
        attendance: decode_rows::<AttendanceRecord>(doc, "attendance"),
    };

    if let Some(claimed) = doc.get("checksum").and_then(|v| v.as_str()) {
        match collection_values(&state) {
            Ok(values) => {
                let actual = checksum_of(&values);
                if actual != claimed {
                    warn!(claimed, actual, "backup checksum mismatch, importing anyway");
                }
            }
            Err(e) => warn!(error = %e, "could not verify backup checksum"),
        }
    }

    Ok(state)
}

fn decode_rows<T: Default + DeserializeOwned>(doc: &Value, key: &str) -> Vec<T> {
    let Some(raw) = doc.get(key) else {
        return Vec::new();
    };
    let Some(items) = raw.as_array() else {
        if !raw.is_null() {
            warn!(key, "backup collection is not an array, using empty");
        }
        return Vec::new();
    };
    items
        .iter()
        .map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "malformed backup record, using default");
                T::default()
            }
        })
        .collect()
}
