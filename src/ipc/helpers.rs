use crate::api::{ApiError, ClubApi};
use crate::attendance::AttendanceError;
use crate::ipc::types::Backend;
use crate::schema::FieldErrors;
use crate::session::CaptureError;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;

/// `{id, ok: true, result}`
pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({ "id": id, "ok": true, "result": result })
}

/// `{id, ok: false, error: {code, message, details?}}`; `details` is left out
/// entirely when there is nothing to add.
pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(errors: &FieldErrors) -> Self {
        Self {
            code: "validation_failed",
            message: format!("check the highlighted fields: {}", errors),
            details: Some(json!({ "fieldErrors": errors })),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ApiError> for HandlerErr {
    fn from(e: ApiError) -> Self {
        if let ApiError::Unauthorized = e {
            log::warn!("backend rejected credentials");
        }
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

impl From<CaptureError> for HandlerErr {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::Validation(errors) => HandlerErr::validation(&errors),
            other => {
                let details = match &other {
                    CaptureError::Submission(api) => api.details(),
                    _ => None,
                };
                Self {
                    code: other.code(),
                    message: other.to_string(),
                    details,
                }
            }
        }
    }
}

impl From<AttendanceError> for HandlerErr {
    fn from(e: AttendanceError) -> Self {
        let details = match &e {
            AttendanceError::Load(api) | AttendanceError::Submission(api) => api.details(),
            AttendanceError::NotInRoster(id) | AttendanceError::JustificationWhilePresent(id) => {
                Some(json!({ "athleteId": id }))
            }
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn backend_api(backend: &Option<Backend>) -> Result<&dyn ClubApi, HandlerErr> {
    backend.as_ref().map(|b| b.api()).ok_or_else(|| HandlerErr {
        code: "no_backend",
        message: "select a workspace or connect to a server first".to_string(),
        details: None,
    })
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing/invalid {}", key)))
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

pub fn get_optional_time(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<NaiveTime>, HandlerErr> {
    let Some(raw) = get_optional_str(params, key) else {
        return Ok(None);
    };
    NaiveTime::parse_from_str(&raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
        .map(Some)
        .map_err(|_| HandlerErr::bad_params(format!("{} must be HH:MM", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_omits_empty_details() {
        let v = err("7", "bad_params", "missing date", None);
        assert_eq!(v["ok"], false);
        assert!(v["error"].get("details").is_none());
    }

    #[test]
    fn domain_errors_keep_their_codes() {
        let e = HandlerErr::from(AttendanceError::NotInRoster(4));
        assert_eq!(e.code, "not_found");
        assert_eq!(e.details, Some(json!({ "athleteId": 4 })));

        let e = HandlerErr::from(CaptureError::Submission(ApiError::Unauthorized));
        assert_eq!(e.code, "unauthorized");

        let mut fields = FieldErrors::default();
        fields.insert("date", "date is required");
        let e = HandlerErr::from(CaptureError::Validation(fields));
        assert_eq!(e.code, "validation_failed");
        assert_eq!(e.details, Some(json!({ "fieldErrors": { "date": "date is required" } })));
    }

    #[test]
    fn time_params_accept_minutes_or_seconds() {
        let p = json!({ "a": "08:30", "b": "08:30:15", "c": "8h" });
        assert_eq!(
            get_optional_time(&p, "a").ok().flatten(),
            NaiveTime::from_hms_opt(8, 30, 0)
        );
        assert!(get_optional_time(&p, "b").ok().flatten().is_some());
        assert!(get_optional_time(&p, "c").is_err());
        assert_eq!(get_optional_time(&p, "missing").ok().flatten(), None);
    }
}
