use rusqlite::Connection;

use super::error::HandlerErr;
use super::types::AppState;
use crate::auth::Session;
use crate::finance;

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_session(state: &AppState) -> Result<&Session, HandlerErr> {
    state
        .session
        .as_ref()
        .ok_or_else(|| HandlerErr::new("unauthenticated", "sign in first"))
}

pub fn req_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let v = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if v.is_empty() {
        return Err(HandlerErr::validation(key, format!("{} must not be empty", key)));
    }
    Ok(v)
}

pub fn opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Tri-state patch for an optional text column: an absent key keeps the
/// stored value, an explicit null clears it, a string replaces it.
pub fn patch_text(
    patch: &serde_json::Value,
    key: &str,
    old: Option<String>,
) -> Option<String> {
    match patch.get(key) {
        None => old,
        Some(v) if v.is_null() => None,
        Some(_) => opt_str(patch, key),
    }
}

/// Amounts are integers in minor currency units and must be positive.
pub fn req_amount(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    let v = params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::validation(key, format!("{} must be a whole number", key)))?;
    if v <= 0 {
        return Err(HandlerErr::validation(key, format!("{} must be greater than zero", key)));
    }
    Ok(v)
}

pub fn req_date(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let v = req_str(params, key)?;
    if finance::parse_calendar_date(&v).is_none() {
        return Err(HandlerErr::validation(key, format!("{} must be a YYYY-MM-DD date", key)));
    }
    Ok(v)
}

pub fn opt_date(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match opt_str(params, key) {
        None => Ok(None),
        Some(v) => {
            if finance::parse_calendar_date(&v).is_none() {
                return Err(HandlerErr::validation(
                    key,
                    format!("{} must be a YYYY-MM-DD date", key),
                ));
            }
            Ok(Some(v))
        }
    }
}

pub fn req_enum(
    params: &serde_json::Value,
    key: &str,
    allowed: &[&str],
) -> Result<String, HandlerErr> {
    let v = req_str(params, key)?;
    if !allowed.contains(&v.as_str()) {
        return Err(HandlerErr::validation(
            key,
            format!("{} must be one of {}", key, allowed.join(", ")),
        ));
    }
    Ok(v)
}

pub fn opt_enum(
    params: &serde_json::Value,
    key: &str,
    allowed: &[&str],
) -> Result<Option<String>, HandlerErr> {
    match opt_str(params, key) {
        None => Ok(None),
        Some(v) => {
            if !allowed.contains(&v.as_str()) {
                return Err(HandlerErr::validation(
                    key,
                    format!("{} must be one of {}", key, allowed.join(", ")),
                ));
            }
            Ok(Some(v))
        }
    }
}
