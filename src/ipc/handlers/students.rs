//! Student records. References to classes are plain strings; a dangling
//! classId renders as "Unknown" rather than failing. Deletes never cascade
//! into payments or score sheets.

use serde_json::{json, Map, Value};

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, new_id, parse_date, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_stamp, Student};
use crate::store::{Collection, Store};

fn parse_gender(raw: &str) -> Result<String, HandlerErr> {
    let t = raw.trim();
    if t.eq_ignore_ascii_case("male") {
        Ok("Male".to_string())
    } else if t.eq_ignore_ascii_case("female") {
        Ok("Female".to_string())
    } else {
        Err(HandlerErr::bad_params("gender must be Male or Female"))
    }
}

fn student_row(store: &Store, student: &Student) -> Value {
    json!({
        "id": student.id,
        "admissionNo": student.admission_no,
        "firstName": student.first_name,
        "lastName": student.last_name,
        "displayName": student.display_name(),
        "gender": student.gender,
        "classId": student.class_id,
        "className": store.state.resolve_class_name(student.class_id.as_deref()),
        "guardianName": student.guardian_name,
        "guardianPhone": student.guardian_phone,
        "dateOfBirth": student.date_of_birth,
        "passport": student.passport,
        "createdAt": student.created_at,
    })
}

fn students_list(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;
    let rows: Vec<Value> = store
        .state
        .students
        .iter()
        .filter(|s| match &class_id {
            Some(cid) => s.class_id.as_deref() == Some(cid.as_str()),
            None => true,
        })
        .map(|s| student_row(store, s))
        .collect();
    Ok(json!({ "students": rows }))
}

fn students_get(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = store
        .state
        .find_student(&student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "student": student_row(store, student) }))
}

fn students_create(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let admission_no = get_required_str(params, "admissionNo")?;
    let first_name = get_required_str(params, "firstName")?;
    let last_name = get_required_str(params, "lastName")?;
    let gender = parse_gender(&get_required_str(params, "gender")?)?;
    let class_id = get_optional_str(params, "classId")?;
    let guardian_name = get_optional_str(params, "guardianName")?.unwrap_or_default();
    let guardian_phone = get_optional_str(params, "guardianPhone")?.unwrap_or_default();
    let date_of_birth = match get_optional_str(params, "dateOfBirth")? {
        Some(d) => Some(parse_date(&d, "dateOfBirth")?),
        None => None,
    };
    let passport = get_optional_str(params, "passport")?;

    if store
        .state
        .students
        .iter()
        .any(|s| s.admission_no == admission_no)
    {
        return Err(HandlerErr::bad_params_with(
            "admissionNo already in use",
            json!({ "admissionNo": admission_no }),
        ));
    }

    let student = Student {
        id: new_id(),
        admission_no,
        first_name,
        last_name,
        gender,
        class_id,
        guardian_name,
        guardian_phone,
        date_of_birth,
        passport,
        created_at: now_stamp(),
    };
    let row = student_row(store, &student);
    let student_id = student.id.clone();
    store.state.students.push(student);
    store.persist(Collection::Students);

    Ok(json!({ "studentId": student_id, "student": row }))
}

fn apply_student_patch(student: &mut Student, patch: &Map<String, Value>) -> Result<(), HandlerErr> {
    for (k, v) in patch {
        match k.as_str() {
            "admissionNo" | "firstName" | "lastName" => {
                let s = v
                    .as_str()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        HandlerErr::bad_params(format!("{} must be a non-empty string", k))
                    })?;
                match k.as_str() {
                    "admissionNo" => student.admission_no = s,
                    "firstName" => student.first_name = s,
                    _ => student.last_name = s,
                }
            }
            "gender" => {
                let s = v
                    .as_str()
                    .ok_or_else(|| HandlerErr::bad_params("gender must be string"))?;
                student.gender = parse_gender(s)?;
            }
            "classId" => {
                student.class_id = if v.is_null() {
                    None
                } else {
                    Some(
                        v.as_str()
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .ok_or_else(|| {
                                HandlerErr::bad_params("classId must be string or null")
                            })?,
                    )
                };
            }
            "guardianName" | "guardianPhone" => {
                let s = if v.is_null() {
                    String::new()
                } else {
                    v.as_str()
                        .map(|s| s.trim().to_string())
                        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string", k)))?
                };
                if k == "guardianName" {
                    student.guardian_name = s;
                } else {
                    student.guardian_phone = s;
                }
            }
            "dateOfBirth" => {
                student.date_of_birth = if v.is_null() {
                    None
                } else {
                    let s = v
                        .as_str()
                        .ok_or_else(|| HandlerErr::bad_params("dateOfBirth must be string"))?;
                    Some(parse_date(s.trim(), "dateOfBirth")?)
                };
            }
            "passport" => {
                student.passport = if v.is_null() {
                    None
                } else {
                    Some(
                        v.as_str()
                            .map(|s| s.to_string())
                            .ok_or_else(|| HandlerErr::bad_params("passport must be string"))?,
                    )
                };
            }
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown student field: {}",
                    k
                )))
            }
        }
    }
    Ok(())
}

fn students_update(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let current = store
        .state
        .find_student(&student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;

    let mut next = current.clone();
    apply_student_patch(&mut next, patch)?;

    if next.admission_no != current.admission_no
        && store
            .state
            .students
            .iter()
            .any(|s| s.id != student_id && s.admission_no == next.admission_no)
    {
        return Err(HandlerErr::bad_params_with(
            "admissionNo already in use",
            json!({ "admissionNo": next.admission_no }),
        ));
    }

    let slot = store
        .state
        .students
        .iter_mut()
        .find(|s| s.id == student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    *slot = next.clone();
    store.persist(Collection::Students);

    Ok(json!({ "student": student_row(store, &next) }))
}

fn students_delete(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let before = store.state.students.len();
    store.state.students.retain(|s| s.id != student_id);
    if store.state.students.len() == before {
        return Err(HandlerErr::not_found("student not found"));
    }
    store.persist(Collection::Students);
    Ok(json!({ "deleted": true }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_list(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_get(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_create(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_update(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_delete(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.get" => Some(handle_get(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.update" => Some(handle_update(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
