use super::{ApiError, ApiResult, ClubApi};
use crate::model::{
    Athlete, AthleteId, AthleteQuery, AthleteStats, AttendanceQuery, AttendanceRecord,
    BulkAttendanceRequest, BulkAttendanceResult, Evaluation, EvaluationId, EvaluationInput, Page,
    TestId, TestPayload, TestRecord,
};
use anyhow::Context;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Client for the club REST server.
pub struct HttpClubApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpClubApi {
    pub fn new(base_url: &str, token: Option<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("base url must start with http:// or https://: {}", base_url);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent(concat!("clubd/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(t) => rb.bearer_auth(t),
            None => rb,
        }
    }

    fn send_value(&self, rb: RequestBuilder) -> ApiResult<serde_json::Value> {
        let resp = rb.send().map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        log::debug!("http response {} ({} bytes)", status, body.len());
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn send<T: DeserializeOwned>(&self, rb: RequestBuilder) -> ApiResult<T> {
        decode(self.send_value(rb)?)
    }
}

fn decode<T: DeserializeOwned>(v: serde_json::Value) -> ApiResult<T> {
    serde_json::from_value(v).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Error bodies look like `{status, message|detail, errors?}`; `detail` may be
/// a string or a list of validation entries.
pub(crate) fn error_from_body(status: u16, body: &str) -> ApiError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
                .or_else(|| match v.get("detail") {
                    Some(serde_json::Value::String(s)) => Some(s.clone()),
                    Some(serde_json::Value::Null) | None => None,
                    Some(other) => Some(other.to_string()),
                })
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("request failed with status {}", status));
    if status == 404 {
        return ApiError::NotFound(message);
    }
    ApiError::Rejected {
        status,
        message,
        errors: parsed.and_then(|v| v.get("errors").cloned()),
    }
}

/// `GET /attendances` answers either `{items: [...]}` or a bare array.
pub(crate) fn decode_attendance_list(v: serde_json::Value) -> ApiResult<Vec<AttendanceRecord>> {
    match v {
        serde_json::Value::Array(_) => decode(v),
        serde_json::Value::Object(mut obj) => match obj.remove("items") {
            Some(items) => decode(items),
            None => Err(ApiError::Decode("attendance response has no items".into())),
        },
        serde_json::Value::Null => Ok(Vec::new()),
        other => Err(ApiError::Decode(format!(
            "unexpected attendance response: {}",
            other
        ))),
    }
}

/// `GET /evaluations/:id/tests` answers `{all: [...]}`.
pub(crate) fn decode_test_list(v: serde_json::Value) -> ApiResult<Vec<TestRecord>> {
    match v {
        serde_json::Value::Array(_) => decode(v),
        serde_json::Value::Object(mut obj) => match obj.remove("all") {
            Some(all) => decode(all),
            None => Err(ApiError::Decode("test list response has no all[]".into())),
        },
        other => Err(ApiError::Decode(format!("unexpected test list: {}", other))),
    }
}

fn athlete_query_params(q: &AthleteQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", q.page.max(1).to_string()),
        ("limit", q.limit.max(1).to_string()),
    ];
    if let Some(s) = q.search.as_ref().filter(|s| !s.trim().is_empty()) {
        params.push(("search", s.trim().to_string()));
    }
    if let Some(t) = q.type_athlete.as_ref().filter(|s| !s.trim().is_empty()) {
        params.push(("type_athlete", t.clone()));
    }
    if let Some(active) = q.is_active {
        params.push(("is_active", active.to_string()));
    }
    params
}

impl ClubApi for HttpClubApi {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    fn list_athletes(&self, query: &AthleteQuery) -> ApiResult<Page<Athlete>> {
        self.send(
            self.request(Method::GET, "/athletes")
                .query(&athlete_query_params(query)),
        )
    }

    fn athlete_stats(&self, athlete_id: AthleteId) -> ApiResult<AthleteStats> {
        self.send(self.request(Method::GET, &format!("/athletes/{}/stats", athlete_id)))
    }

    fn list_attendance(&self, query: &AttendanceQuery) -> ApiResult<Vec<AttendanceRecord>> {
        let mut params = vec![("date", query.date.format("%Y-%m-%d").to_string())];
        if let Some(t) = &query.type_athlete {
            params.push(("type_athlete", t.clone()));
        }
        if let Some(s) = &query.search {
            params.push(("search", s.clone()));
        }
        let v = self.send_value(self.request(Method::GET, "/attendances").query(&params))?;
        decode_attendance_list(v)
    }

    fn bulk_upsert_attendance(
        &self,
        req: &BulkAttendanceRequest,
    ) -> ApiResult<BulkAttendanceResult> {
        self.send(self.request(Method::POST, "/attendances/bulk").json(req))
    }

    fn list_evaluations(&self) -> ApiResult<Vec<Evaluation>> {
        let v = self.send_value(self.request(Method::GET, "/evaluations"))?;
        match v {
            serde_json::Value::Object(mut obj) if obj.contains_key("items") => {
                decode(obj.remove("items").unwrap_or_default())
            }
            other => decode(other),
        }
    }

    fn get_evaluation(&self, id: EvaluationId) -> ApiResult<Evaluation> {
        self.send(self.request(Method::GET, &format!("/evaluations/{}", id)))
    }

    fn create_evaluation(&self, input: &EvaluationInput) -> ApiResult<Evaluation> {
        self.send(self.request(Method::POST, "/evaluations").json(input))
    }

    fn update_evaluation(
        &self,
        id: EvaluationId,
        input: &EvaluationInput,
    ) -> ApiResult<Evaluation> {
        self.send(
            self.request(Method::PUT, &format!("/evaluations/{}", id))
                .json(input),
        )
    }

    fn list_evaluation_tests(&self, id: EvaluationId) -> ApiResult<Vec<TestRecord>> {
        let v = self.send_value(self.request(Method::GET, &format!("/evaluations/{}/tests", id)))?;
        decode_test_list(v)
    }

    fn create_test(&self, payload: &TestPayload) -> ApiResult<TestRecord> {
        let path = format!("/tests/{}", payload.test_type().as_str());
        self.send(self.request(Method::POST, &path).json(payload))
    }

    fn update_test(&self, test_id: TestId, payload: &TestPayload) -> ApiResult<TestRecord> {
        let path = format!("/tests/{}/{}", payload.test_type().as_str(), test_id);
        self.send(self.request(Method::PUT, &path).json(payload))
    }
}
