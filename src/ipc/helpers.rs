use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::schedule::ScheduleError;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use tracing::error;

/// Handler-local error carrying a stable IPC code. Converted to the wire
/// envelope at the edge of each handler.
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<JsonValue>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "not_found",
            message: message.into(),
            details: None,
        }
    }

    pub fn db(e: rusqlite::Error) -> Self {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> JsonValue {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ScheduleError> for HandlerErr {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::Validation(m) => HandlerErr::bad_params(m),
            ScheduleError::NotFound(m) => HandlerErr::not_found(m),
            ScheduleError::Conflict(reasons) => HandlerErr {
                code: "schedule_conflict",
                message: "schedule slot already booked".to_string(),
                details: Some(json!({ "reasons": reasons })),
            },
            ScheduleError::DataIntegrity(m) => HandlerErr {
                code: "data_integrity",
                message: m,
                details: None,
            },
            ScheduleError::Db(source) => {
                // Full detail goes to the log, not to the caller.
                error!(error = %source, "unexpected storage failure");
                HandlerErr {
                    code: "db_query_failed",
                    message: "internal storage error".to_string(),
                    details: None,
                }
            }
        }
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(params: &JsonValue, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn required_i64(params: &JsonValue, key: &str) -> Result<i64, HandlerErr> {
    match params.get(key) {
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn required_u32(params: &JsonValue, key: &str) -> Result<u32, HandlerErr> {
    match params.get(key) {
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("{} must be a non-negative integer", key))
            }),
    }
}

pub fn opt_i64(params: &JsonValue, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer or null", key))),
    }
}

pub fn opt_str(params: &JsonValue, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be string or null", key)))?
                .trim()
                .to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

pub fn required_date(params: &JsonValue, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = required_str(params, key)?;
    crate::schedule::parse_date(key, &raw).map_err(HandlerErr::from)
}

pub fn row_exists(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<bool, HandlerErr> {
    conn.query_row(sql, params, |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
        .map_err(HandlerErr::db)
}

pub fn ensure_teacher_exists(conn: &Connection, teacher_id: i64) -> Result<(), HandlerErr> {
    if row_exists(conn, "SELECT 1 FROM teachers WHERE id = ?", [teacher_id])? {
        Ok(())
    } else {
        Err(HandlerErr::not_found(format!(
            "teacher {} not found",
            teacher_id
        )))
    }
}

pub fn ensure_class_exists(conn: &Connection, class_id: i64) -> Result<(), HandlerErr> {
    if row_exists(conn, "SELECT 1 FROM school_classes WHERE id = ?", [class_id])? {
        Ok(())
    } else {
        Err(HandlerErr::not_found(format!(
            "class {} not found",
            class_id
        )))
    }
}

pub fn ensure_subject_exists(conn: &Connection, subject_id: i64) -> Result<(), HandlerErr> {
    if row_exists(conn, "SELECT 1 FROM subjects WHERE id = ?", [subject_id])? {
        Ok(())
    } else {
        Err(HandlerErr::not_found(format!(
            "subject {} not found",
            subject_id
        )))
    }
}
