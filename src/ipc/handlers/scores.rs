//! Score sheets: per-student sheet open/save, the per-subject class entry
//! grid, and the affective/psychomotor skill maps. Totals, grades and
//! remarks are always recomputed here on write; clients never supply them.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, new_id, period, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_stamp, ScoreSheet, SubjectScore};
use crate::store::{Collection, Store};

fn parse_mark(v: Option<&Value>, field: &str, max: f64, at: &Value) -> Result<f64, HandlerErr> {
    let n = v
        .and_then(|v| v.as_f64())
        .ok_or_else(|| {
            HandlerErr::bad_params_with(format!("{} must be a number", field), json!({ "entry": at }))
        })?;
    if !n.is_finite() || !(0.0..=max).contains(&n) {
        return Err(HandlerErr::bad_params_with(
            format!("{} must be between 0 and {}", field, max),
            json!({ "entry": at, "field": field }),
        ));
    }
    Ok(n)
}

/// Builds a subject row from raw marks, recomputing total, grade and remark.
fn build_subject_score(
    subject: String,
    ca1: f64,
    ca2: f64,
    exam: f64,
) -> SubjectScore {
    let total = calc::subject_total(ca1, ca2, exam);
    let (grade, remark) = calc::grade_for(total);
    SubjectScore {
        subject,
        ca1,
        ca2,
        exam,
        total,
        grade: grade.to_string(),
        remark: remark.to_string(),
    }
}

fn sheet_json(sheet: &ScoreSheet) -> Result<Value, HandlerErr> {
    serde_json::to_value(sheet).map_err(|e| HandlerErr::bad_params(e.to_string()))
}

fn empty_sheet(student_id: &str, session: &str, term: &str) -> ScoreSheet {
    ScoreSheet {
        id: String::new(),
        student_id: student_id.to_string(),
        session: session.to_string(),
        term: term.to_string(),
        ..ScoreSheet::default()
    }
}

fn scores_open(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if store.state.find_student(&student_id).is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }
    let p = period(store, params)?;
    let sheet = match store.state.sheet_for(&student_id, &p.session, &p.term) {
        Some(existing) => sheet_json(existing)?,
        None => sheet_json(&empty_sheet(&student_id, &p.session, &p.term))?,
    };
    Ok(json!({ "sheet": sheet }))
}

fn scores_save_sheet(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if store.state.find_student(&student_id).is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }
    let p = period(store, params)?;
    let teacher_remark = get_optional_str(params, "teacherRemark")?;

    let Some(raw_subjects) = params.get("subjects").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("subjects must be an array"));
    };
    let mut subjects: Vec<SubjectScore> = Vec::with_capacity(raw_subjects.len());
    for entry in raw_subjects {
        let subject = entry
            .get("subject")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HandlerErr::bad_params_with("subject must be a non-empty string", json!({ "entry": entry }))
            })?;
        if subjects.iter().any(|row| row.subject == subject) {
            return Err(HandlerErr::bad_params_with(
                "duplicate subject row",
                json!({ "subject": subject }),
            ));
        }
        let ca1 = parse_mark(entry.get("ca1"), "ca1", calc::CA_MAX, entry)?;
        let ca2 = parse_mark(entry.get("ca2"), "ca2", calc::CA_MAX, entry)?;
        let exam = parse_mark(entry.get("exam"), "exam", calc::EXAM_MAX, entry)?;
        subjects.push(build_subject_score(subject, ca1, ca2, exam));
    }

    let stamp = now_stamp();
    let sheet = match store
        .state
        .scores
        .iter_mut()
        .find(|s| s.student_id == student_id && s.session == p.session && s.term == p.term)
    {
        Some(existing) => {
            existing.subjects = subjects;
            if let Some(remark) = teacher_remark {
                existing.teacher_remark = remark;
            }
            existing.updated_at = stamp;
            existing.clone()
        }
        None => {
            let sheet = ScoreSheet {
                id: new_id(),
                student_id,
                session: p.session,
                term: p.term,
                subjects,
                affective: BTreeMap::new(),
                psychomotor: BTreeMap::new(),
                teacher_remark: teacher_remark.unwrap_or_default(),
                updated_at: stamp,
            };
            store.state.scores.push(sheet.clone());
            sheet
        }
    };
    store.persist(Collection::Scores);

    Ok(json!({ "sheet": sheet_json(&sheet)? }))
}

/// The Grading view's entry table: one row per student in the class with any
/// existing marks for the chosen subject.
fn class_subject_open(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let subject = get_required_str(params, "subject")?;
    let class = store
        .state
        .find_class(&class_id)
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    if !store.state.class_subjects(class).contains(&subject) {
        return Err(HandlerErr::bad_params_with(
            "subject is not offered by this class",
            json!({ "subject": subject }),
        ));
    }
    let p = period(store, params)?;

    let rows: Vec<Value> = store
        .state
        .students_in_class(&class_id)
        .into_iter()
        .map(|student| {
            let row = store
                .state
                .sheet_for(&student.id, &p.session, &p.term)
                .and_then(|sheet| sheet.subjects.iter().find(|s| s.subject == subject));
            json!({
                "studentId": student.id,
                "displayName": student.display_name(),
                "admissionNo": student.admission_no,
                "ca1": row.map(|r| r.ca1),
                "ca2": row.map(|r| r.ca2),
                "exam": row.map(|r| r.exam),
                "total": row.map(|r| r.total),
                "grade": row.map(|r| r.grade.clone()),
            })
        })
        .collect();

    Ok(json!({
        "classId": class_id,
        "subject": subject,
        "session": p.session,
        "term": p.term,
        "rows": rows,
    }))
}

/// Bulk upsert of one subject's marks across a class. Entries naming
/// students outside the class are rejected before anything is written.
fn class_subject_save(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let subject = get_required_str(params, "subject")?;
    let class = store
        .state
        .find_class(&class_id)
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    if !store.state.class_subjects(class).contains(&subject) {
        return Err(HandlerErr::bad_params_with(
            "subject is not offered by this class",
            json!({ "subject": subject }),
        ));
    }
    let p = period(store, params)?;

    let Some(raw_entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("entries must be an array"));
    };
    let mut parsed: Vec<(String, f64, f64, f64)> = Vec::with_capacity(raw_entries.len());
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
        let ca1 = parse_mark(entry.get("ca1"), "ca1", calc::CA_MAX, entry)?;
        let ca2 = parse_mark(entry.get("ca2"), "ca2", calc::CA_MAX, entry)?;
        let exam = parse_mark(entry.get("exam"), "exam", calc::EXAM_MAX, entry)?;
        parsed.push((student_id, ca1, ca2, exam));
    }

    let stamp = now_stamp();
    let saved = parsed.len();
    for (student_id, ca1, ca2, exam) in parsed {
        let row = build_subject_score(subject.clone(), ca1, ca2, exam);
        match store
            .state
            .scores
            .iter_mut()
            .find(|s| s.student_id == student_id && s.session == p.session && s.term == p.term)
        {
            Some(sheet) => {
                match sheet.subjects.iter_mut().find(|s| s.subject == subject) {
                    Some(slot) => *slot = row,
                    None => sheet.subjects.push(row),
                }
                sheet.updated_at = stamp.clone();
            }
            None => {
                let mut sheet = empty_sheet(&student_id, &p.session, &p.term);
                sheet.id = new_id();
                sheet.subjects.push(row);
                sheet.updated_at = stamp.clone();
                store.state.scores.push(sheet);
            }
        }
    }
    store.persist(Collection::Scores);

    Ok(json!({ "saved": saved }))
}

/// Replaces one of the two skill maps on a sheet, creating the sheet if the
/// student has no scores yet this period.
fn save_skills(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if store.state.find_student(&student_id).is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }
    let domain = get_required_str(params, "domain")?;
    if domain != "affective" && domain != "psychomotor" {
        return Err(HandlerErr::bad_params(
            "domain must be affective or psychomotor",
        ));
    }
    let Some(raw_ratings) = params.get("ratings").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("ratings must be an object"));
    };
    let mut ratings: BTreeMap<String, String> = BTreeMap::new();
    for (trait_name, rating) in raw_ratings {
        let r = rating
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HandlerErr::bad_params_with(
                    "ratings values must be non-empty strings",
                    json!({ "trait": trait_name }),
                )
            })?;
        ratings.insert(trait_name.trim().to_string(), r);
    }
    let p = period(store, params)?;

    let stamp = now_stamp();
    let sheet = match store
        .state
        .scores
        .iter_mut()
        .find(|s| s.student_id == student_id && s.session == p.session && s.term == p.term)
    {
        Some(existing) => {
            if domain == "affective" {
                existing.affective = ratings;
            } else {
                existing.psychomotor = ratings;
            }
            existing.updated_at = stamp;
            existing.clone()
        }
        None => {
            let mut sheet = empty_sheet(&student_id, &p.session, &p.term);
            sheet.id = new_id();
            if domain == "affective" {
                sheet.affective = ratings;
            } else {
                sheet.psychomotor = ratings;
            }
            sheet.updated_at = stamp;
            store.state.scores.push(sheet.clone());
            sheet
        }
    };
    store.persist(Collection::Scores);

    Ok(json!({ "sheet": sheet_json(&sheet)? }))
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
        "scores.open" => Some(guarded(state, req, |s, p| scores_open(s, p))),
        "scores.saveSheet" => Some(guarded(state, req, scores_save_sheet)),
        "scores.classSubjectOpen" => Some(guarded(state, req, |s, p| class_subject_open(s, p))),
        "scores.classSubjectSave" => Some(guarded(state, req, class_subject_save)),
        "scores.saveSkills" => Some(guarded(state, req, save_skills)),
        _ => None,
    }
}
