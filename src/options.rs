use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Sprint,
    Yoyo,
    Endurance,
    Technical,
}

impl TestType {
    pub const ALL: [TestType; 4] = [
        TestType::Sprint,
        TestType::Yoyo,
        TestType::Endurance,
        TestType::Technical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TestType::Sprint => "sprint",
            TestType::Yoyo => "yoyo",
            TestType::Endurance => "endurance",
            TestType::Technical => "technical",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TestType::Sprint => "Sprint",
            TestType::Yoyo => "Yo-Yo",
            TestType::Endurance => "Endurance",
            TestType::Technical => "Technical assessment",
        }
    }

    pub fn parse(raw: &str) -> Option<TestType> {
        let t = raw.trim().to_ascii_lowercase();
        TestType::ALL.into_iter().find(|tt| tt.as_str() == t)
    }
}

/// Ordinal scale for technical assessment fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleLevel {
    Poor,
    Average,
    Good,
    Excellent,
}

impl Default for ScaleLevel {
    fn default() -> Self {
        ScaleLevel::Average
    }
}

impl ScaleLevel {
    pub const ALL: [ScaleLevel; 4] = [
        ScaleLevel::Poor,
        ScaleLevel::Average,
        ScaleLevel::Good,
        ScaleLevel::Excellent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScaleLevel::Poor => "poor",
            ScaleLevel::Average => "average",
            ScaleLevel::Good => "good",
            ScaleLevel::Excellent => "excellent",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScaleLevel::Poor => "Poor",
            ScaleLevel::Average => "Average",
            ScaleLevel::Good => "Good",
            ScaleLevel::Excellent => "Excellent",
        }
    }

    /// Accepts the stored key or the display label, case-insensitively.
    pub fn parse(raw: &str) -> Option<ScaleLevel> {
        let t = raw.trim();
        ScaleLevel::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(t) || s.label().eq_ignore_ascii_case(t))
    }

    pub fn allowed_list() -> String {
        ScaleLevel::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub const ATHLETE_TYPES: [(&str, &str); 3] = [
    ("student", "Student"),
    ("staff", "Staff"),
    ("external", "External"),
];

pub fn athlete_type_label(key: &str) -> Option<&'static str> {
    ATHLETE_TYPES
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key.trim()))
        .map(|(_, label)| *label)
}

/// Everything the presentation layer needs to render selectors.
pub fn options_json() -> serde_json::Value {
    json!({
        "testTypes": TestType::ALL
            .iter()
            .map(|t| json!({ "key": t.as_str(), "label": t.label() }))
            .collect::<Vec<_>>(),
        "scaleLevels": ScaleLevel::ALL
            .iter()
            .map(|s| json!({ "key": s.as_str(), "label": s.label() }))
            .collect::<Vec<_>>(),
        "athleteTypes": ATHLETE_TYPES
            .iter()
            .map(|(k, l)| json!({ "key": k, "label": l }))
            .collect::<Vec<_>>(),
    })
}
