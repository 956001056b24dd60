//! Fee, payment and expense records plus the balance figures built on them.
//! List methods default to the current session/term and accept `"ALL"` for
//! either filter; write methods require a concrete period. All arithmetic
//! lives in `calc`; handlers only filter, resolve names and shape JSON.

use serde_json::{json, Value};

use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, new_id, parse_amount, parse_date, period, period_filter,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_stamp, today_string, Expense, Fee, Payment};
use crate::store::{Collection, Store};

fn fee_row(store: &Store, fee: &Fee) -> Value {
    json!({
        "id": fee.id,
        "name": fee.name,
        "amount": fee.amount,
        "classId": fee.class_id,
        "className": store.state.resolve_class_name(fee.class_id.as_deref()),
        "session": fee.session,
        "term": fee.term,
    })
}

fn fees_list(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let filter = period_filter(store, params)?;
    let class_id = get_optional_str(params, "classId")?;
    let rows: Vec<Value> = store
        .state
        .fees
        .iter()
        .filter(|f| filter.matches(&f.session, &f.term))
        .filter(|f| match &class_id {
            Some(cid) => f.class_id.as_deref() == Some(cid.as_str()),
            None => true,
        })
        .map(|f| fee_row(store, f))
        .collect();
    Ok(json!({ "fees": rows }))
}

fn fees_create(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let amount = parse_amount(
        params
            .get("amount")
            .ok_or_else(|| HandlerErr::bad_params("missing amount"))?,
        "amount",
    )?;
    let class_id = get_optional_str(params, "classId")?;
    let p = period(store, params)?;

    let fee = Fee {
        id: new_id(),
        name,
        amount,
        class_id,
        session: p.session,
        term: p.term,
    };
    let row = fee_row(store, &fee);
    let fee_id = fee.id.clone();
    store.state.fees.push(fee);
    store.persist(Collection::Fees);

    Ok(json!({ "feeId": fee_id, "fee": row }))
}

fn fees_update(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let fee_id = get_required_str(params, "feeId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let current = store
        .state
        .fees
        .iter()
        .find(|f| f.id == fee_id)
        .ok_or_else(|| HandlerErr::not_found("fee not found"))?;
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
            "amount" => next.amount = parse_amount(v, k)?,
            "classId" => {
                next.class_id = if v.is_null() {
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
            _ => return Err(HandlerErr::bad_params(format!("unknown fee field: {}", k))),
        }
    }

    let slot = store
        .state
        .fees
        .iter_mut()
        .find(|f| f.id == fee_id)
        .ok_or_else(|| HandlerErr::not_found("fee not found"))?;
    *slot = next.clone();
    store.persist(Collection::Fees);

    Ok(json!({ "fee": fee_row(store, &next) }))
}

fn fees_delete(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let fee_id = get_required_str(params, "feeId")?;
    let before = store.state.fees.len();
    store.state.fees.retain(|f| f.id != fee_id);
    if store.state.fees.len() == before {
        return Err(HandlerErr::not_found("fee not found"));
    }
    store.persist(Collection::Fees);
    Ok(json!({ "deleted": true }))
}

fn payment_row(store: &Store, payment: &Payment) -> Value {
    let student_name = store
        .state
        .find_student(&payment.student_id)
        .map(|s| s.display_name())
        .unwrap_or_else(|| "Unknown".to_string());
    json!({
        "id": payment.id,
        "studentId": payment.student_id,
        "studentName": student_name,
        "amount": payment.amount,
        "date": payment.date,
        "session": payment.session,
        "term": payment.term,
        "remark": payment.remark,
        "createdAt": payment.created_at,
    })
}

fn payments_list(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let filter = period_filter(store, params)?;
    let student_id = get_optional_str(params, "studentId")?;
    let rows: Vec<Value> = store
        .state
        .payments
        .iter()
        .filter(|p| filter.matches(&p.session, &p.term))
        .filter(|p| match &student_id {
            Some(sid) => &p.student_id == sid,
            None => true,
        })
        .map(|p| payment_row(store, p))
        .collect();
    Ok(json!({ "payments": rows }))
}

fn payments_create(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if store.state.find_student(&student_id).is_none() {
        return Err(HandlerErr::not_found("student not found"));
    }
    let amount = parse_amount(
        params
            .get("amount")
            .ok_or_else(|| HandlerErr::bad_params("missing amount"))?,
        "amount",
    )?;
    let date = match get_optional_str(params, "date")? {
        Some(d) => parse_date(&d, "date")?,
        None => today_string(),
    };
    let remark = get_optional_str(params, "remark")?.unwrap_or_default();
    let p = period(store, params)?;

    let payment = Payment {
        id: new_id(),
        student_id,
        amount,
        date,
        session: p.session,
        term: p.term,
        remark,
        created_at: now_stamp(),
    };
    let row = payment_row(store, &payment);
    let payment_id = payment.id.clone();
    store.state.payments.push(payment);
    store.persist(Collection::Payments);

    Ok(json!({ "paymentId": payment_id, "payment": row }))
}

fn payments_update(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let payment_id = get_required_str(params, "paymentId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let current = store
        .state
        .payments
        .iter()
        .find(|p| p.id == payment_id)
        .ok_or_else(|| HandlerErr::not_found("payment not found"))?;
    let mut next = current.clone();
    for (k, v) in patch {
        match k.as_str() {
            "amount" => next.amount = parse_amount(v, k)?,
            "date" => {
                let s = v
                    .as_str()
                    .ok_or_else(|| HandlerErr::bad_params("date must be string"))?;
                next.date = parse_date(s.trim(), "date")?;
            }
            "remark" => {
                next.remark = if v.is_null() {
                    String::new()
                } else {
                    v.as_str()
                        .map(|s| s.trim().to_string())
                        .ok_or_else(|| HandlerErr::bad_params("remark must be string"))?
                };
            }
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown payment field: {}",
                    k
                )))
            }
        }
    }

    let slot = store
        .state
        .payments
        .iter_mut()
        .find(|p| p.id == payment_id)
        .ok_or_else(|| HandlerErr::not_found("payment not found"))?;
    *slot = next.clone();
    store.persist(Collection::Payments);

    Ok(json!({ "payment": payment_row(store, &next) }))
}

fn payments_delete(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let payment_id = get_required_str(params, "paymentId")?;
    let before = store.state.payments.len();
    store.state.payments.retain(|p| p.id != payment_id);
    if store.state.payments.len() == before {
        return Err(HandlerErr::not_found("payment not found"));
    }
    store.persist(Collection::Payments);
    Ok(json!({ "deleted": true }))
}

fn expense_row(expense: &Expense) -> Value {
    json!({
        "id": expense.id,
        "amount": expense.amount,
        "date": expense.date,
        "session": expense.session,
        "term": expense.term,
        "remark": expense.remark,
        "createdAt": expense.created_at,
    })
}

fn expenses_list(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let filter = period_filter(store, params)?;
    let rows: Vec<Value> = store
        .state
        .expenses
        .iter()
        .filter(|e| filter.matches(&e.session, &e.term))
        .map(expense_row)
        .collect();
    Ok(json!({ "expenses": rows }))
}

fn expenses_create(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let amount = parse_amount(
        params
            .get("amount")
            .ok_or_else(|| HandlerErr::bad_params("missing amount"))?,
        "amount",
    )?;
    let date = match get_optional_str(params, "date")? {
        Some(d) => parse_date(&d, "date")?,
        None => today_string(),
    };
    let remark = get_required_str(params, "remark")?;
    let p = period(store, params)?;

    let expense = Expense {
        id: new_id(),
        amount,
        date,
        session: p.session,
        term: p.term,
        remark,
        created_at: now_stamp(),
    };
    let row = expense_row(&expense);
    let expense_id = expense.id.clone();
    store.state.expenses.push(expense);
    store.persist(Collection::Expenses);

    Ok(json!({ "expenseId": expense_id, "expense": row }))
}

fn expenses_update(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let expense_id = get_required_str(params, "expenseId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };

    let current = store
        .state
        .expenses
        .iter()
        .find(|e| e.id == expense_id)
        .ok_or_else(|| HandlerErr::not_found("expense not found"))?;
    let mut next = current.clone();
    for (k, v) in patch {
        match k.as_str() {
            "amount" => next.amount = parse_amount(v, k)?,
            "date" => {
                let s = v
                    .as_str()
                    .ok_or_else(|| HandlerErr::bad_params("date must be string"))?;
                next.date = parse_date(s.trim(), "date")?;
            }
            "remark" => {
                next.remark = v
                    .as_str()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| HandlerErr::bad_params("remark must be a non-empty string"))?;
            }
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "unknown expense field: {}",
                    k
                )))
            }
        }
    }

    let slot = store
        .state
        .expenses
        .iter_mut()
        .find(|e| e.id == expense_id)
        .ok_or_else(|| HandlerErr::not_found("expense not found"))?;
    *slot = next.clone();
    store.persist(Collection::Expenses);

    Ok(json!({ "expense": expense_row(&next) }))
}

fn expenses_delete(store: &mut Store, params: &Value) -> Result<Value, HandlerErr> {
    let expense_id = get_required_str(params, "expenseId")?;
    let before = store.state.expenses.len();
    store.state.expenses.retain(|e| e.id != expense_id);
    if store.state.expenses.len() == before {
        return Err(HandlerErr::not_found("expense not found"));
    }
    store.persist(Collection::Expenses);
    Ok(json!({ "deleted": true }))
}

fn student_balance(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = store
        .state
        .find_student(&student_id)
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    let p = period(store, params)?;
    let balance = calc::student_balance(
        student,
        &store.state.fees,
        &store.state.payments,
        &p.session,
        &p.term,
    );
    Ok(json!({
        "studentId": student_id,
        "session": p.session,
        "term": p.term,
        "billed": balance.billed,
        "paid": balance.paid,
        "balance": balance.balance,
    }))
}

fn bursary_summary(store: &Store, params: &Value) -> Result<Value, HandlerErr> {
    let p = period(store, params)?;
    let financials = calc::period_financials(
        &store.state.students,
        &store.state.fees,
        &store.state.payments,
        &store.state.expenses,
        &p.session,
        &p.term,
    );
    let summary =
        serde_json::to_value(financials).map_err(|e| HandlerErr::bad_params(e.to_string()))?;
    Ok(json!({
        "session": p.session,
        "term": p.term,
        "summary": summary,
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
        "fees.list" => Some(guarded(state, req, |s, p| fees_list(s, p))),
        "fees.create" => Some(guarded(state, req, fees_create)),
        "fees.update" => Some(guarded(state, req, fees_update)),
        "fees.delete" => Some(guarded(state, req, fees_delete)),
        "payments.list" => Some(guarded(state, req, |s, p| payments_list(s, p))),
        "payments.create" => Some(guarded(state, req, payments_create)),
        "payments.update" => Some(guarded(state, req, payments_update)),
        "payments.delete" => Some(guarded(state, req, payments_delete)),
        "expenses.list" => Some(guarded(state, req, |s, p| expenses_list(s, p))),
        "expenses.create" => Some(guarded(state, req, expenses_create)),
        "expenses.update" => Some(guarded(state, req, expenses_update)),
        "expenses.delete" => Some(guarded(state, req, expenses_delete)),
        "bursary.studentBalance" => Some(guarded(state, req, |s, p| student_balance(s, p))),
        "bursary.summary" => Some(guarded(state, req, |s, p| bursary_summary(s, p))),
        _ => None,
    }
}
