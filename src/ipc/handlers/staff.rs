//! Teacher and non-teaching staff records: the same CRUD idiom for both.
//! A teacher's class-teacher assignment is derived by scanning classes.

use serde_json::{json, Value};

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, new_id, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_stamp, StaffMember, Teacher};
use crate::store::{Collection, Store};

fn teacher_row(store: &Store, teacher: &Teacher) -> Value {
    let class_teacher_of = store
        .state
        .classes
        .iter()
        .find(|c| c.teacher_id.as_deref() == Some(teacher.id.as_str()))
        .map(|c| c.name.clone());
    json!({
        "id": teacher.id,
        "name": teacher.name,
        "phone": teacher.phone,
        "email": teacher.email,
        "classTeacherOf": class_teacher_of,
        "createdAt": teacher.created_at,
    })
}

fn teachers_list(store: &Store) -> Result<Value, HandlerErr> {
    let rows: Vec<Value> = store
        .state
        .teachers
        .iter()
        .map(|t| teacher_row(store, t))
        .collect();
    Ok(json!({ "teachers": rows }))
}

fn teachers_create(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let phone = get_optional_str(params, "phone")?.unwrap_or_default();
    let email = get_optional_str(params, "email")?.unwrap_or_default();

    let teacher = Teacher {
        id: new_id(),
        name,
        phone,
        email,
        created_at: now_stamp(),
    };
    let row = teacher_row(store, &teacher);
    let teacher_id = teacher.id.clone();
    store.state.teachers.push(teacher);
    store.persist(Collection::Teachers);

    Ok(json!({ "teacherId": teacher_id, "teacher": row }))
}

fn teachers_update(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let current = store
        .state
        .find_teacher(&teacher_id)
        .ok_or_else(|| HandlerErr::not_found("teacher not found"))?;
    let mut next = current.clone();
    for (k, v) in patch {
        match k.as_str() {
            "name" => {
                next.name = v
                    .as_str()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| HandlerErr::bad_params("name must be a non-empty string"))?;
            }
            "phone" | "email" => {
                let s = if v.is_null() {
                    String::new()
                } else {
                    v.as_str()
                        .map(|s| s.trim().to_string())
                        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string", k)))?
                };
                if k == "phone" {
                    next.phone = s;
                } else {
                    next.email = s;
                }
            }
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown teacher field: {}",
                    k
                )))
            }
        }
    }

    let slot = store
        .state
        .teachers
        .iter_mut()
        .find(|t| t.id == teacher_id)
        .ok_or_else(|| HandlerErr::not_found("teacher not found"))?;
    *slot = next.clone();
    store.persist(Collection::Teachers);

    Ok(json!({ "teacher": teacher_row(store, &next) }))
}

fn teachers_delete(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let before = store.state.teachers.len();
    store.state.teachers.retain(|t| t.id != teacher_id);
    if store.state.teachers.len() == before {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    store.persist(Collection::Teachers);
    Ok(json!({ "deleted": true }))
}

fn staff_row(member: &StaffMember) -> Value {
    json!({
        "id": member.id,
        "name": member.name,
        "role": member.role,
        "phone": member.phone,
        "createdAt": member.created_at,
    })
}

fn staff_list(store: &Store) -> Result<Value, HandlerErr> {
    let rows: Vec<Value> = store.state.staff.iter().map(staff_row).collect();
    Ok(json!({ "staff": rows }))
}

fn staff_create(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let role = get_required_str(params, "role")?;
    let phone = get_optional_str(params, "phone")?.unwrap_or_default();

    let member = StaffMember {
        id: new_id(),
        name,
        role,
        phone,
        created_at: now_stamp(),
    };
    let row = staff_row(&member);
    let staff_id = member.id.clone();
    store.state.staff.push(member);
    store.persist(Collection::Staff);

    Ok(json!({ "staffId": staff_id, "staff": row }))
}

fn staff_update(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let staff_id = get_required_str(params, "staffId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let current = store
        .state
        .staff
        .iter()
        .find(|m| m.id == staff_id)
        .ok_or_else(|| HandlerErr::not_found("staff member not found"))?;
    let mut next = current.clone();
    for (k, v) in patch {
        match k.as_str() {
            "name" | "role" => {
                let s = v
                    .as_str()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        HandlerErr::bad_params(format!("{} must be a non-empty string", k))
                    })?;
                if k == "name" {
                    next.name = s;
                } else {
                    next.role = s;
                }
            }
            "phone" => {
                next.phone = if v.is_null() {
                    String::new()
                } else {
                    v.as_str()
                        .map(|s| s.trim().to_string())
                        .ok_or_else(|| HandlerErr::bad_params("phone must be string"))?
                };
            }
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown staff field: {}",
                    k
                )))
            }
        }
    }

    let slot = store
        .state
        .staff
        .iter_mut()
        .find(|m| m.id == staff_id)
        .ok_or_else(|| HandlerErr::not_found("staff member not found"))?;
    *slot = next.clone();
    store.persist(Collection::Staff);

    Ok(json!({ "staff": staff_row(&next) }))
}

fn staff_delete(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let staff_id = get_required_str(params, "staffId")?;
    let before = store.state.staff.len();
    store.state.staff.retain(|m| m.id != staff_id);
    if store.state.staff.len() == before {
        return Err(HandlerErr::not_found("staff member not found"));
    }
    store.persist(Collection::Staff);
    Ok(json!({ "deleted": true }))
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
        "teachers.list" => Some(guarded(state, req, |s, _| teachers_list(s))),
        "teachers.create" => Some(guarded(state, req, teachers_create)),
        "teachers.update" => Some(guarded(state, req, teachers_update)),
        "teachers.delete" => Some(guarded(state, req, teachers_delete)),
        "staff.list" => Some(guarded(state, req, |s, _| staff_list(s))),
        "staff.create" => Some(guarded(state, req, staff_create)),
        "staff.update" => Some(guarded(state, req, staff_update)),
        "staff.delete" => Some(guarded(state, req, staff_delete)),
        _ => None,
    }
}
