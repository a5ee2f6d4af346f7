//! Field rules for every test type.
//!
//! Capture forms arrive as untyped `field -> string` maps. [`validate`] turns a
//! form into a [`TestPayload`] or a map of per-field messages. It never touches
//! state or the network, so create and edit flows run the exact same rules.

use crate::model::{
    EnduranceMetrics, SprintMetrics, TechnicalMetrics, TestMetrics, TestPayload, YoyoMetrics,
};
use crate::options::{ScaleLevel, TestType};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub type RawForm = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(|s| s.as_str())
    }

    /// First message per field wins.
    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.values().cloned().collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Positive,
    NonNegative,
    AtLeast(f64),
}

impl Bound {
    fn check(self, field: &str, v: f64) -> Result<(), String> {
        match self {
            Bound::Positive if v <= 0.0 => Err(format!("{} must be greater than 0", field)),
            Bound::NonNegative if v < 0.0 => Err(format!("{} must be 0 or greater", field)),
            Bound::AtLeast(min) if v < min => Err(format!("{} must be at least {}", field, min)),
            _ => Ok(()),
        }
    }
}

struct FormReader<'a> {
    raw: &'a RawForm,
    errors: FieldErrors,
}

impl<'a> FormReader<'a> {
    fn new(raw: &'a RawForm) -> Self {
        Self {
            raw,
            errors: FieldErrors::default(),
        }
    }

    fn text(&self, field: &str) -> Option<&'a str> {
        self.raw
            .get(field)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    fn parse_number(&mut self, field: &str, t: &str, bound: Bound) -> Option<f64> {
        let v = match t.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                self.errors.insert(field, format!("{} must be a number", field));
                return None;
            }
        };
        if let Err(message) = bound.check(field, v) {
            self.errors.insert(field, message);
            return None;
        }
        Some(v)
    }

    fn required_number(&mut self, field: &str, bound: Bound) -> Option<f64> {
        let Some(t) = self.text(field) else {
            self.errors.insert(field, format!("{} is required", field));
            return None;
        };
        self.parse_number(field, t, bound)
    }

    fn optional_number(&mut self, field: &str) -> Option<f64> {
        let t = self.text(field)?;
        self.parse_number(field, t, Bound::NonNegative)
    }

    fn required_count(&mut self, field: &str) -> Option<i64> {
        let v = self.required_number(field, Bound::NonNegative)?;
        if v.fract() != 0.0 || v > i64::MAX as f64 {
            self.errors
                .insert(field, format!("{} must be a whole number", field));
            return None;
        }
        Some(v as i64)
    }

    fn required_id(&mut self, field: &str) -> Option<i64> {
        let Some(t) = self.text(field) else {
            self.errors.insert(field, format!("{} is required", field));
            return None;
        };
        // Ids may come through as "12" or "12.0" depending on the form widget.
        match t.parse::<f64>() {
            Ok(v) if v.is_finite() && v.fract() == 0.0 && v >= 1.0 && v <= i64::MAX as f64 => {
                Some(v as i64)
            }
            _ => {
                self.errors
                    .insert(field, format!("{} must be a positive integer", field));
                None
            }
        }
    }

    fn scale(&mut self, field: &str) -> ScaleLevel {
        let Some(t) = self.text(field) else {
            return ScaleLevel::default();
        };
        match ScaleLevel::parse(t) {
            Some(level) => level,
            None => {
                self.errors.insert(
                    field,
                    format!("{} must be one of: {}", field, ScaleLevel::allowed_list()),
                );
                ScaleLevel::default()
            }
        }
    }

    fn date(&mut self, field: &str) -> Option<NaiveDate> {
        let t = self.text(field)?;
        match NaiveDate::parse_from_str(t, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                self.errors
                    .insert(field, format!("{} must be a date (YYYY-MM-DD)", field));
                None
            }
        }
    }
}

fn read_sprint(r: &mut FormReader<'_>) -> Option<TestMetrics> {
    let distance_meters = r.required_number("distance_meters", Bound::Positive);
    let time_0_10_s = r.required_number("time_0_10_s", Bound::Positive);
    let time_0_30_s = r.required_number("time_0_30_s", Bound::Positive);
    let time_10_30_s = r.optional_number("time_10_30_s");
    let avg_speed_ms = r.optional_number("avg_speed_ms");
    let est_max_speed_ms = r.optional_number("est_max_speed_ms");
    if let (Some(t10), Some(t30)) = (time_0_10_s, time_0_30_s) {
        if t30 <= t10 {
            r.errors
                .insert("time_0_30_s", "time_0_30_s must be greater than time_0_10_s");
        }
    }
    Some(TestMetrics::Sprint(SprintMetrics {
        distance_meters: distance_meters?,
        time_0_10_s: time_0_10_s?,
        time_0_30_s: time_0_30_s?,
        time_10_30_s,
        avg_speed_ms,
        est_max_speed_ms,
    }))
}

fn read_endurance(r: &mut FormReader<'_>) -> Option<TestMetrics> {
    let min_duration = r.required_number("min_duration", Bound::AtLeast(1.0));
    let total_distance_m = r.required_number("total_distance_m", Bound::Positive);
    let pace_min_per_km = r.optional_number("pace_min_per_km");
    let est_vo2_max = r.optional_number("est_vo2_max");
    Some(TestMetrics::Endurance(EnduranceMetrics {
        min_duration: min_duration?,
        total_distance_m: total_distance_m?,
        pace_min_per_km,
        est_vo2_max,
    }))
}

fn read_yoyo(r: &mut FormReader<'_>) -> Option<TestMetrics> {
    let shuttle_count = r.required_count("shuttle_count");
    let final_level = r.required_number("final_level", Bound::Positive);
    let failures = r.required_count("failures");
    let total_distance = r.optional_number("total_distance");
    let vo2_max = r.optional_number("vo2_max");
    Some(TestMetrics::Yoyo(YoyoMetrics {
        shuttle_count: shuttle_count?,
        final_level: final_level?,
        failures: failures?,
        total_distance,
        vo2_max,
    }))
}

fn read_technical(r: &mut FormReader<'_>) -> TestMetrics {
    TestMetrics::Technical(TechnicalMetrics {
        ball_control: r.scale("ball_control"),
        short_pass: r.scale("short_pass"),
        long_pass: r.scale("long_pass"),
        shooting: r.scale("shooting"),
        dribbling: r.scale("dribbling"),
    })
}

pub fn validate(test_type: TestType, raw: &RawForm) -> Result<TestPayload, FieldErrors> {
    let mut r = FormReader::new(raw);
    let evaluation_id = r.required_id("evaluation_id");
    let athlete_id = r.required_id("athlete_id");
    let date = r.date("date");
    let observations = r.text("observations").map(|s| s.to_string());

    let metrics = match test_type {
        TestType::Sprint => read_sprint(&mut r),
        TestType::Yoyo => read_yoyo(&mut r),
        TestType::Endurance => read_endurance(&mut r),
        TestType::Technical => Some(read_technical(&mut r)),
    };

    match (evaluation_id, athlete_id, metrics) {
        (Some(evaluation_id), Some(athlete_id), Some(metrics)) if r.errors.is_empty() => {
            Ok(TestPayload {
                evaluation_id,
                athlete_id,
                date,
                observations,
                metrics,
            })
        }
        _ => Err(r.errors),
    }
}

/// JSON form values from the IPC layer: numbers and bools are stringified,
/// nulls are dropped so they read as "missing".
pub fn raw_form_from_json(v: &serde_json::Value) -> RawForm {
    let mut out = RawForm::new();
    let Some(obj) = v.as_object() else {
        return out;
    };
    for (k, val) in obj {
        let s = match val {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        out.insert(k.clone(), s);
    }
    out
}
