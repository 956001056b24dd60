//! Shared handler plumbing: the error carrier and the parameter parsers
//! every method family uses.

use chrono::NaiveDate;
use serde_json::Value;

use crate::ipc::error::err;
use crate::model::TERMS;
use crate::store::Store;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params_with(message: impl Into<String>, details: Value) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

/// Absent, null, or blank all read as `None`; a non-string value is an error.
pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be string or null",
            key
        ))),
    }
}

pub fn parse_amount(v: &Value, key: &str) -> Result<f64, HandlerErr> {
    let n = v
        .as_f64()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))?;
    if !n.is_finite() || n <= 0.0 {
        return Err(HandlerErr::bad_params(format!("{} must be positive", key)));
    }
    Ok(n)
}

pub fn parse_date(s: &str, key: &str) -> Result<String, HandlerErr> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))?;
    Ok(s.to_string())
}

/// Canonicalizes a term name, case-insensitively, to the stored spelling.
pub fn parse_term(raw: &str) -> Result<String, HandlerErr> {
    let t = raw.trim();
    for term in TERMS {
        if term.eq_ignore_ascii_case(t) {
            return Ok(term.to_string());
        }
    }
    Err(HandlerErr::bad_params(format!(
        "term must be one of: {}",
        TERMS.join(", ")
    )))
}

/// A session label looks like `2025/2026` with consecutive years.
pub fn parse_session(raw: &str) -> Result<String, HandlerErr> {
    let t = raw.trim();
    let parts: Vec<&str> = t.split('/').collect();
    if parts.len() == 2 {
        if let (Ok(a), Ok(b)) = (parts[0].parse::<i32>(), parts[1].parse::<i32>()) {
            if b == a + 1 {
                return Ok(format!("{}/{}", a, b));
            }
        }
    }
    Err(HandlerErr::bad_params(
        "session must look like 2025/2026".to_string(),
    ))
}

#[derive(Debug, Clone)]
pub struct Period {
    pub session: String,
    pub term: String,
}

/// Resolves a concrete session/term for write methods: missing fields default
/// to the current settings period, `"ALL"` is rejected.
pub fn period(store: &Store, params: &Value) -> Result<Period, HandlerErr> {
    let session = match get_optional_str(params, "session")? {
        Some(s) if s.eq_ignore_ascii_case("all") => {
            return Err(HandlerErr::bad_params(
                "session must be concrete for this method",
            ))
        }
        Some(s) => parse_session(&s)?,
        None => store.state.settings.current_session.clone(),
    };
    let term = match get_optional_str(params, "term")? {
        Some(t) if t.eq_ignore_ascii_case("all") => {
            return Err(HandlerErr::bad_params(
                "term must be concrete for this method",
            ))
        }
        Some(t) => parse_term(&t)?,
        None => store.state.settings.current_term.clone(),
    };
    Ok(Period { session, term })
}

#[derive(Debug, Clone)]
pub struct PeriodFilter {
    pub session: Option<String>,
    pub term: Option<String>,
}

impl PeriodFilter {
    pub fn matches(&self, session: &str, term: &str) -> bool {
        self.session.as_deref().map(|s| s == session).unwrap_or(true)
            && self.term.as_deref().map(|t| t == term).unwrap_or(true)
    }
}

/// List-method variant: missing fields default to the current period and
/// `"ALL"` (case-insensitive) lifts that filter entirely.
pub fn period_filter(store: &Store, params: &Value) -> Result<PeriodFilter, HandlerErr> {
    let session = match get_optional_str(params, "session")? {
        Some(s) if s.eq_ignore_ascii_case("all") => None,
        Some(s) => Some(parse_session(&s)?),
        None => Some(store.state.settings.current_session.clone()),
    };
    let term = match get_optional_str(params, "term")? {
        Some(t) if t.eq_ignore_ascii_case("all") => None,
        Some(t) => Some(parse_term(&t)?),
        None => Some(store.state.settings.current_term.clone()),
    };
    Ok(PeriodFilter { session, term })
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
