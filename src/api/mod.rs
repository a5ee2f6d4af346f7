//! The REST contract the capture and attendance workflows consume.
//!
//! [`ClubApi`] is the seam: [`http::HttpClubApi`] talks to the club server,
//! [`workspace::WorkspaceClubApi`] serves the same contract from a local
//! SQLite workspace.

pub mod http;
pub mod workspace;

use crate::model::{
    Athlete, AthleteId, AthleteQuery, AthleteStats, AttendanceQuery, AttendanceRecord,
    BulkAttendanceRequest, BulkAttendanceResult, Evaluation, EvaluationId, EvaluationInput, Page,
    TestId, TestPayload, TestRecord,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Rejected {
        status: u16,
        message: String,
        errors: Option<serde_json::Value>,
    },

    #[error("session expired, sign in again")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl ApiError {
    /// IPC error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Rejected { .. } => "server_rejected",
            ApiError::Unauthorized => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::Transport(_) => "network_error",
            ApiError::Decode(_) => "bad_response",
            ApiError::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Rejected { status, errors, .. } => Some(serde_json::json!({
                "status": status,
                "errors": errors,
            })),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub trait ClubApi: Send + Sync {
    fn describe(&self) -> String;

    fn list_athletes(&self, query: &AthleteQuery) -> ApiResult<Page<Athlete>>;
    fn athlete_stats(&self, athlete_id: AthleteId) -> ApiResult<AthleteStats>;

    fn list_attendance(&self, query: &AttendanceQuery) -> ApiResult<Vec<AttendanceRecord>>;
    fn bulk_upsert_attendance(&self, req: &BulkAttendanceRequest)
        -> ApiResult<BulkAttendanceResult>;

    fn list_evaluations(&self) -> ApiResult<Vec<Evaluation>>;
    fn get_evaluation(&self, id: EvaluationId) -> ApiResult<Evaluation>;
    fn create_evaluation(&self, input: &EvaluationInput) -> ApiResult<Evaluation>;
    fn update_evaluation(&self, id: EvaluationId, input: &EvaluationInput)
        -> ApiResult<Evaluation>;

    fn list_evaluation_tests(&self, id: EvaluationId) -> ApiResult<Vec<TestRecord>>;
    fn create_test(&self, payload: &TestPayload) -> ApiResult<TestRecord>;
    fn update_test(&self, test_id: TestId, payload: &TestPayload) -> ApiResult<TestRecord>;
}
