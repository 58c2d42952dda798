use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::Value;

use crate::error::EngineError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{Audience, Period};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> Value {
        err(Some(id), self.code, self.message, self.details)
    }
}

impl From<EngineError> for HandlerErr {
    fn from(e: EngineError) -> Self {
        Self {
            code: e.code(),
            details: e.details(),
            message: e.to_string(),
        }
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        Self {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

impl From<serde_json::Error> for HandlerErr {
    fn from(e: serde_json::Error) -> Self {
        Self::bad_params(e.to_string())
    }
}

/// Run `f` against the open workspace database and wrap its outcome in the
/// response envelope.
pub fn with_db<F>(state: &AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(Some(&req.id), "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_f64(params: &Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

/// Optional array of strings; absent means empty.
pub fn get_str_list(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Ok(Vec::new());
    };
    let arr = v
        .as_array()
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array", key)))?;
    arr.iter()
        .map(|x| {
            x.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain strings", key)))
        })
        .collect()
}

/// `now` override as RFC 3339, otherwise the current UTC time.
pub fn parse_now(params: &Value) -> Result<DateTime<Utc>, HandlerErr> {
    match params.get("now").and_then(|v| v.as_str()) {
        None => Ok(Utc::now()),
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|d| d.with_timezone(&Utc))
            .map_err(|_| HandlerErr::bad_params("now must be an RFC 3339 timestamp")),
    }
}

pub fn parse_audience(params: &Value) -> Result<Audience, HandlerErr> {
    match params.get("audience").and_then(|v| v.as_str()) {
        None => Ok(Audience::Student),
        Some(raw) => Audience::parse(raw)
            .ok_or_else(|| HandlerErr::bad_params("audience must be mentor or student")),
    }
}

/// `month` and `year` from params, defaulting to the period containing `now`.
pub fn parse_period(params: &Value, now: DateTime<Utc>) -> Result<Period, HandlerErr> {
    let month = params.get("month").and_then(|v| v.as_u64());
    let year = params.get("year").and_then(|v| v.as_i64());
    match (month, year) {
        (None, None) => Ok(Period::of(now)),
        (Some(m), Some(y)) => {
            let m = u32::try_from(m).map_err(|_| HandlerErr::bad_params("month out of range"))?;
            let y = i32::try_from(y).map_err(|_| HandlerErr::bad_params("year out of range"))?;
            Ok(Period::new(m, y)?)
        }
        _ => Err(HandlerErr::bad_params("month and year must be given together")),
    }
}
