use crate::calc::GradeScale;
use crate::config;
use crate::filter::{parse_view_filter, ViewFilter};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::model::{Level, Semester, MAX_COURSE_UNITS};
use rusqlite::Connection;
use serde_json::{json, Value};

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// Trimmed, non-empty string parameter.
pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    match optional_str(params, key)? {
        Some(s) => Ok(s),
        None => Err(HandlerErr::bad_params(format!("missing {key}"))),
    }
}

/// `None` when absent or null; present values must be non-empty strings.
pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{key} must be a string")));
            };
            let t = s.trim();
            if t.is_empty() {
                return Err(HandlerErr::bad_params(format!("{key} must not be empty")));
            }
            Ok(Some(t.to_string()))
        }
    }
}

pub fn optional_level(params: &Value, key: &str) -> Result<Option<Level>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => Level::from_json(v).map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{key} must be 100, 200, 300 or 400"))
                .with_details(json!({ key: v }))
        }),
    }
}

pub fn required_level(params: &Value, key: &str) -> Result<Level, HandlerErr> {
    optional_level(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

pub fn optional_semester(params: &Value, key: &str) -> Result<Option<Semester>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) if v.as_str().map(|s| s.eq_ignore_ascii_case("all")).unwrap_or(false) => Ok(None),
        Some(v) => Semester::from_json(v).map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{key} must be First or Second"))
                .with_details(json!({ key: v }))
        }),
    }
}

pub fn required_semester(params: &Value, key: &str) -> Result<Semester, HandlerErr> {
    optional_semester(params, key)?
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {key}")))
}

/// Credit units: an integer in 1..=MAX_COURSE_UNITS, given as a number or
/// numeric string.
pub fn optional_units(params: &Value, key: &str) -> Result<Option<u32>, HandlerErr> {
    let Some(v) = params.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let n = v
        .as_u64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<u64>().ok()));
    match n.and_then(|n| u32::try_from(n).ok()) {
        Some(n) if (1..=MAX_COURSE_UNITS).contains(&n) => Ok(Some(n)),
        _ => Err(HandlerErr::bad_params(format!(
            "{key} must be an integer from 1 to {MAX_COURSE_UNITS}"
        ))
        .with_details(json!({ key: v }))),
    }
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        // Lecturer records in the dashboard used "Yes"/"No".
        Some(Value::String(s)) if s.eq_ignore_ascii_case("yes") => Ok(Some(true)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("no") => Ok(Some(false)),
        Some(_) => Err(HandlerErr::bad_params(format!("{key} must be a boolean"))),
    }
}

pub fn view_filter(params: &Value) -> Result<ViewFilter, HandlerErr> {
    Ok(parse_view_filter(params.get("filter"))?)
}

pub fn grade_scale(conn: &Connection) -> Result<GradeScale, HandlerErr> {
    config::load_grade_scale(conn).map_err(HandlerErr::db_query)
}
