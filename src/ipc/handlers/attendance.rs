//! Daily attendance registers. A register is one record per (class, date,
//! session, term); opening one returns the full roster with any saved
//! statuses, saving replaces the record whole.

use serde_json::{json, Value};

use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, new_id, parse_date, period, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{AttendanceEntry, AttendanceRecord};
use crate::store::{Collection, Store};

const STATUSES: [&str; 3] = ["present", "absent", "late"];

fn parse_status(raw: &str, at: &Value) -> Result<String, HandlerErr> {
    let t = raw.trim().to_ascii_lowercase();
    if STATUSES.contains(&t.as_str()) {
        Ok(t)
    } else {
        Err(HandlerErr::bad_params_with(
            "status must be one of: present, absent, late",
            json!({ "entry": at }),
        ))
    }
}

/// Every student in the class appears in the register, marked or not;
/// status is null until saved.
fn register_open(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = parse_date(&get_required_str(params, "date")?, "date")?;
    if store.state.find_class(&class_id).is_none() {
        return Err(HandlerErr::not_found("class not found"));
    }
    let p = period(store, params)?;

    let record = store.state.attendance.iter().find(|r| {
        r.class_id == class_id && r.date == date && r.session == p.session && r.term == p.term
    });
    let rows: Vec<Value> = store
        .state
        .students_in_class(&class_id)
        .into_iter()
        .map(|student| {
            let status = record.and_then(|r| {
                r.entries
                    .iter()
                    .find(|e| e.student_id == student.id)
                    .map(|e| e.status.clone())
            });
            json!({
                "studentId": student.id,
                "displayName": student.display_name(),
                "admissionNo": student.admission_no,
                "status": status,
            })
        })
        .collect();

    Ok(json!({
        "classId": class_id,
        "date": date,
        "session": p.session,
        "term": p.term,
        "saved": record.is_some(),
        "rows": rows,
    }))
}

fn attendance_save(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = parse_date(&get_required_str(params, "date")?, "date")?;
    if store.state.find_class(&class_id).is_none() {
        return Err(HandlerErr::not_found("class not found"));
    }
    let p = period(store, params)?;

    let Some(raw_entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("entries must be an array"));
    };
    let mut entries: Vec<AttendanceEntry> = Vec::with_capacity(raw_entries.len());
    for entry in raw_entries {
        let student_id = entry
            .get("studentId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                HandlerErr::bad_params_with("missing studentId", json!({ "entry": entry }))
            })?;
        let in_class = store
            .state
            .find_student(&student_id)
            .map(|s| s.class_id.as_deref() == Some(class_id.as_str()))
            .unwrap_or(false);
        if !in_class {
            return Err(HandlerErr::bad_params_with(
                "student is not in this class",
                json!({ "studentId": student_id }),
            ));
        }
        if entries.iter().any(|e| e.student_id == student_id) {
            return Err(HandlerErr::bad_params_with(
                "duplicate entry for student",
                json!({ "studentId": student_id }),
            ));
        }
        let status = entry
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                HandlerErr::bad_params_with("missing status", json!({ "entry": entry }))
            })?;
        entries.push(AttendanceEntry {
            student_id,
            status: parse_status(status, entry)?,
        });
    }

    let count = entries.len();
    match store.state.attendance.iter_mut().find(|r| {
        r.class_id == class_id && r.date == date && r.session == p.session && r.term == p.term
    }) {
        Some(record) => record.entries = entries,
        None => store.state.attendance.push(AttendanceRecord {
            id: new_id(),
            class_id,
            date,
            session: p.session,
            term: p.term,
            entries,
        }),
    }
    store.persist(Collection::Attendance);

    Ok(json!({ "saved": true, "entries": count }))
}

fn attendance_summary(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    if store.state.find_class(&class_id).is_none() {
        return Err(HandlerErr::not_found("class not found"));
    }
    let p = period(store, params)?;

    let rows: Vec<Value> = store
        .state
        .students_in_class(&class_id)
        .into_iter()
        .map(|student| {
            let tally = calc::attendance_tally(
                &store.state.attendance,
                &class_id,
                &student.id,
                &p.session,
                &p.term,
            );
            json!({
                "studentId": student.id,
                "displayName": student.display_name(),
                "present": tally.present,
                "absent": tally.absent,
                "late": tally.late,
                "daysRecorded": tally.days_recorded,
            })
        })
        .collect();

    Ok(json!({
        "classId": class_id,
        "session": p.session,
        "term": p.term,
        "rows": rows,
    }))
}

fn guarded<F>(state: &mut AppState, req: &Request, op: F) -> serde_json::Value
where
    F: FnOnce(&mut Store, &Value) -> Result<Value, HandlerErr>,
{
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match op(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.registerOpen" => Some(guarded(state, req, |s, p| register_open(s, p))),
        "attendance.save" => Some(guarded(state, req, attendance_save)),
        "attendance.summary" => Some(guarded(state, req, |s, p| attendance_summary(s, p))),
        _ => None,
    }
}
