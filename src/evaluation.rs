use crate::model::EvaluationInput;
use crate::schema::{FieldErrors, RawForm};
use chrono::{NaiveDate, NaiveTime};

fn text<'a>(raw: &'a RawForm, field: &str) -> Option<&'a str> {
    raw.get(field).map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Builds the evaluation body from form input. The date may not lie in the
/// past when the evaluation is first created; edits keep whatever date the
/// evaluation already had without that check.
pub fn evaluation_from_form(
    raw: &RawForm,
    user_id: i64,
    today: NaiveDate,
    creating: bool,
) -> Result<EvaluationInput, FieldErrors> {
    let mut errors = FieldErrors::default();

    let name = text(raw, "name").map(|s| s.to_string());
    if name.is_none() {
        errors.insert("name", "name is required");
    }

    let date = match text(raw, "date") {
        None => {
            errors.insert("date", "date is required");
            None
        }
        Some(t) => match NaiveDate::parse_from_str(t, "%Y-%m-%d") {
            Ok(d) if creating && d < today => {
                errors.insert("date", "date cannot be in the past");
                None
            }
            Ok(d) => Some(d),
            Err(_) => {
                errors.insert("date", "date must be a date (YYYY-MM-DD)");
                None
            }
        },
    };

    let time = match text(raw, "time") {
        None => None,
        Some(t) => match NaiveTime::parse_from_str(t, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        {
            Ok(v) => Some(v),
            Err(_) => {
                errors.insert("time", "time must be HH:MM");
                None
            }
        },
    };

    match (name, date) {
        (Some(name), Some(date)) if errors.is_empty() => Ok(EvaluationInput {
            name,
            date,
            time,
            location: text(raw, "location").map(|s| s.to_string()),
            observations: text(raw, "observations").map(|s| s.to_string()),
            user_id,
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).expect("date")
    }

    fn form(pairs: &[(&str, &str)]) -> RawForm {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn past_date_rejected_only_on_create() {
        let raw = form(&[("name", "Spring"), ("date", "2024-04-30")]);
        let errs = evaluation_from_form(&raw, 1, today(), true).expect_err("past date");
        assert_eq!(errs.get("date"), Some("date cannot be in the past"));

        let input = evaluation_from_form(&raw, 1, today(), false).expect("edit keeps date");
        assert_eq!(input.date, NaiveDate::from_ymd_opt(2024, 4, 30).expect("date"));
    }

    #[test]
    fn today_is_allowed_and_optional_fields_trim() {
        let raw = form(&[
            ("name", " Spring "),
            ("date", "2024-05-01"),
            ("time", "17:30"),
            ("location", "  "),
        ]);
        let input = evaluation_from_form(&raw, 4, today(), true).expect("valid");
        assert_eq!(input.name, "Spring");
        assert_eq!(input.time, NaiveTime::from_hms_opt(17, 30, 0));
        assert_eq!(input.location, None);
        assert_eq!(input.user_id, 4);
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let errs = evaluation_from_form(&RawForm::new(), 1, today(), true).expect_err("empty");
        assert_eq!(errs.get("name"), Some("name is required"));
        assert_eq!(errs.get("date"), Some("date is required"));
    }
}
