//! Print-model methods: broadsheet, report card, ID cards and the dashboard
//! summary. They return layout-free JSON models; rendering is the shell's
//! concern. All math is delegated to `calc`.

use serde_json::{json, Value};

use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_required_str, period, HandlerErr, Period};
use crate::ipc::types::{AppState, Request};
use crate::model::{SchoolClass, Student};
use crate::store::Store;

fn school_block(store: &Store) -> Value {
    let s = &store.state.settings;
    json!({
        "name": s.school_name,
        "address": s.address,
        "phone": s.phone,
        "email": s.email,
        "motto": s.motto,
        "logo": s.logo,
        "principalSignature": s.principal_signature,
    })
}

fn broadsheet_rows(
    store: &Store,
    class: &SchoolClass,
    subjects: &[String],
    p: &Period,
) -> Vec<calc::BroadsheetRow> {
    let entries: Vec<(String, String, String, Vec<Option<f64>>)> = store
        .state
        .students_in_class(&class.id)
        .into_iter()
        .map(|student| {
            let sheet = store.state.sheet_for(&student.id, &p.session, &p.term);
            let totals: Vec<Option<f64>> = subjects
                .iter()
                .map(|subject| {
                    sheet.and_then(|sh| {
                        sh.subjects
                            .iter()
                            .find(|row| &row.subject == subject)
                            .map(|row| row.total)
                    })
                })
                .collect();
            (
                student.id.clone(),
                student.display_name(),
                student.admission_no.clone(),
                totals,
            )
        })
        .collect();
    calc::rank_broadsheet(entries, subjects.len())
}

fn broadsheet_model(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let class = store
        .state
        .find_class(&class_id)
        .ok_or_else(|| HandlerErr::not_found("class not found"))?;
    let p = period(store, params)?;
    let subjects = store.state.class_subjects(class);
    let rows = broadsheet_rows(store, class, &subjects, &p);
    let rows = serde_json::to_value(rows).map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    Ok(json!({
        "school": school_block(store),
        "className": class.name,
        "session": p.session,
        "term": p.term,
        "subjects": subjects,
        "rows": rows,
    }))
}

fn report_card_model(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = store
        .state
        .find_student(&student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let p = period(store, params)?;

    let sheet = store.state.sheet_for(&student_id, &p.session, &p.term);
    let subject_rows: Vec<Value> = sheet
        .map(|sh| {
            sh.subjects
                .iter()
                .map(|row| {
                    json!({
                        "subject": row.subject,
                        "ca1": row.ca1,
                        "ca2": row.ca2,
                        "exam": row.exam,
                        "total": row.total,
                        "grade": row.grade,
                        "remark": row.remark,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    // The report card average divides by subjects actually taken, unlike the
    // broadsheet average which shares the class denominator.
    let taken = sheet.map(|sh| sh.subjects.len()).unwrap_or(0);
    let grand_total: f64 = sheet
        .map(|sh| sh.subjects.iter().map(|r| r.total).sum())
        .unwrap_or(0.0);
    let average = if taken > 0 {
        calc::round1(grand_total / taken as f64)
    } else {
        0.0
    };
    let (grade, _) = calc::grade_for(average);

    // Position comes from the class broadsheet; null when the class
    // reference dangles.
    let class = student
        .class_id
        .as_deref()
        .and_then(|cid| store.state.find_class(cid));
    let position = class.and_then(|c| {
        let subjects = store.state.class_subjects(c);
        broadsheet_rows(store, c, &subjects, &p)
            .into_iter()
            .find(|row| row.student_id == student_id)
            .map(|row| row.position)
    });
    let class_size = class
        .map(|c| store.state.students_in_class(&c.id).len())
        .unwrap_or(0);

    let attendance = class
        .map(|c| {
            calc::attendance_tally(
                &store.state.attendance,
                &c.id,
                &student_id,
                &p.session,
                &p.term,
            )
        })
        .unwrap_or_default();
    let attendance =
        serde_json::to_value(attendance).map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    let balance = calc::student_balance(
        student,
        &store.state.fees,
        &store.state.payments,
        &p.session,
        &p.term,
    );
    let fee_status = if balance.balance > 0.0 { "Owing" } else { "Cleared" };

    Ok(json!({
        "school": school_block(store),
        "student": {
            "id": student.id,
            "displayName": student.display_name(),
            "admissionNo": student.admission_no,
            "gender": student.gender,
            "className": store.state.resolve_class_name(student.class_id.as_deref()),
            "passport": student.passport,
        },
        "session": p.session,
        "term": p.term,
        "subjects": subject_rows,
        "grandTotal": calc::round1(grand_total),
        "average": average,
        "grade": grade,
        "position": position,
        "classSize": class_size,
        "attendance": attendance,
        "affective": sheet.map(|sh| sh.affective.clone()).unwrap_or_default(),
        "psychomotor": sheet.map(|sh| sh.psychomotor.clone()).unwrap_or_default(),
        "teacherRemark": sheet.map(|sh| sh.teacher_remark.clone()).unwrap_or_default(),
        "headRemark": calc::head_remark_for(grade),
        "fees": {
            "billed": balance.billed,
            "paid": balance.paid,
            "balance": balance.balance,
            "status": fee_status,
        },
        "nextTermBegins": store.state.settings.next_term_begins,
    }))
}

fn id_card_entry(store: &Store, student: &Student) -> Value {
    json!({
        "studentId": student.id,
        "displayName": student.display_name(),
        "admissionNo": student.admission_no,
        "className": store.state.resolve_class_name(student.class_id.as_deref()),
        "passport": student.passport,
    })
}

fn id_card_model(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = store
        .state
        .find_student(&student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let s = &store.state.settings;
    Ok(json!({
        "school": { "name": s.school_name, "motto": s.motto, "logo": s.logo },
        "session": s.current_session,
        "card": id_card_entry(store, student),
    }))
}

fn id_card_batch_model(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    if store.state.find_class(&class_id).is_none() {
        return Err(HandlerErr::not_found("class not found"));
    }
    let cards: Vec<Value> = store
        .state
        .students_in_class(&class_id)
        .into_iter()
        .map(|student| id_card_entry(store, student))
        .collect();
    let s = &store.state.settings;
    Ok(json!({
        "school": { "name": s.school_name, "motto": s.motto, "logo": s.logo },
        "session": s.current_session,
        "cards": cards,
    }))
}

fn dashboard_summary(store: &Store) -> Result<Value, HandlerErr> {
    let s = &store.state.settings;
    let financials = calc::period_financials(
        &store.state.students,
        &store.state.fees,
        &store.state.payments,
        &store.state.expenses,
        &s.current_session,
        &s.current_term,
    );
    Ok(json!({
        "counts": {
            "students": store.state.students.len(),
            "teachers": store.state.teachers.len(),
            "staff": store.state.staff.len(),
            "classes": store.state.classes.len(),
        },
        "period": { "session": s.current_session, "term": s.current_term },
        "financials": {
            "collected": financials.collected,
            "expenses": financials.expenses,
            "outstanding": financials.outstanding,
        },
    }))
}

fn guarded<F>(state: &mut AppState, req: &Request, op: F) -> serde_json::Value
where
    F: FnOnce(&Store, &Value) -> Result<Value, HandlerErr>,
{
    let Some(store) = state.store.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match op(store, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.broadsheetModel" => Some(guarded(state, req, broadsheet_model)),
        "reports.reportCardModel" => Some(guarded(state, req, report_card_model)),
        "reports.idCardModel" => Some(guarded(state, req, id_card_model)),
        "reports.idCardBatchModel" => Some(guarded(state, req, id_card_batch_model)),
        "dashboard.summary" => Some(guarded(state, req, |s, _| dashboard_summary(s))),
        _ => None,
    }
}
