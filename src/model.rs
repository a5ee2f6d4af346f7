use crate::options::{ScaleLevel, TestType};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type AthleteId = i64;
pub type EvaluationId = i64;
pub type TestId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: AthleteId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_athlete: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Athlete {
    pub fn display_name(&self) -> String {
        match (self.last_name.trim(), self.first_name.trim()) {
            ("", "") => format!("#{}", self.id),
            ("", first) => first.to_string(),
            (last, "") => last.to_string(),
            (last, first) => format!("{}, {}", last, first),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AthleteQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub type_athlete: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub name: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    #[serde(default)]
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationInput {
    pub name: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub athlete_id: AthleteId,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    pub is_present: bool,
    #[serde(default)]
    pub justification: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceQuery {
    pub date: NaiveDate,
    pub type_athlete: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAttendanceEntry {
    pub athlete_id: AthleteId,
    pub is_present: bool,
    pub justification: Option<String>,
}

/// Envelope for `POST /attendances/bulk`. `time` is left out when unset so
/// the server stamps the current time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAttendanceRequest {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    pub records: Vec<BulkAttendanceEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAttendanceResult {
    pub created_count: u64,
    pub updated_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintMetrics {
    pub distance_meters: f64,
    pub time_0_10_s: f64,
    pub time_0_30_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_10_30_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_speed_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_max_speed_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnduranceMetrics {
    pub min_duration: f64,
    pub total_distance_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace_min_per_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_vo2_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoyoMetrics {
    pub shuttle_count: i64,
    pub final_level: f64,
    pub failures: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vo2_max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalMetrics {
    pub ball_control: ScaleLevel,
    pub short_pass: ScaleLevel,
    pub long_pass: ScaleLevel,
    pub shooting: ScaleLevel,
    pub dribbling: ScaleLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test_type", rename_all = "snake_case")]
pub enum TestMetrics {
    Sprint(SprintMetrics),
    Yoyo(YoyoMetrics),
    Endurance(EnduranceMetrics),
    Technical(TechnicalMetrics),
}

impl TestMetrics {
    pub fn test_type(&self) -> TestType {
        match self {
            TestMetrics::Sprint(_) => TestType::Sprint,
            TestMetrics::Yoyo(_) => TestType::Yoyo,
            TestMetrics::Endurance(_) => TestType::Endurance,
            TestMetrics::Technical(_) => TestType::Technical,
        }
    }
}

/// Normalized body for `POST /tests/{type}` and `PUT /tests/{type}/:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPayload {
    pub evaluation_id: EvaluationId,
    pub athlete_id: AthleteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    #[serde(flatten)]
    pub metrics: TestMetrics,
}

impl TestPayload {
    pub fn test_type(&self) -> TestType {
        self.metrics.test_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: TestId,
    pub evaluation_id: EvaluationId,
    pub athlete_id: AthleteId,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    #[serde(flatten)]
    pub metrics: TestMetrics,
}

impl TestRecord {
    pub fn test_type(&self) -> TestType {
        self.metrics.test_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteStats {
    pub athlete_id: AthleteId,
    pub test_count: u64,
    #[serde(default)]
    pub by_type: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test_date: Option<NaiveDate>,
}
