use crate::cache::QueryKey;
use crate::ipc::helpers::{backend_api, get_optional_str, get_required_i64, respond, today, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Athlete, TestRecord};
use crate::options::TestType;
use crate::session::CaptureError;
use crate::schema::raw_form_from_json;
use serde_json::json;

fn parse_test_type(raw: &str) -> Result<TestType, HandlerErr> {
    TestType::parse(raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: format!("unknown test type: {}", raw),
        details: Some(json!({
            "allowed": TestType::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>()
        })),
    })
}

fn form_param(params: &serde_json::Value) -> Result<&serde_json::Value, HandlerErr> {
    params
        .get("form")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing form object"))
}

fn capture_open(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let evaluation_id = get_required_i64(params, "evaluationId")?;
    let test_type = get_optional_str(params, "testType")
        .map(|s| parse_test_type(&s))
        .transpose()?;
    let api = backend_api(&state.backend)?;
    let evaluation = api.get_evaluation(evaluation_id)?;
    state.capture.open(&evaluation, test_type);
    Ok(state.capture.state_json())
}

fn capture_set_test_type(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = get_optional_str(params, "testType") else {
        return Err(HandlerErr::bad_params("missing testType"));
    };
    let test_type = parse_test_type(&raw)?;
    state.capture.set_test_type(test_type)?;
    Ok(state.capture.state_json())
}

fn capture_select_athlete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = params.get("athlete") else {
        return Err(HandlerErr::bad_params("missing athlete"));
    };
    let athlete: Athlete = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid athlete: {}", e)))?;
    state.capture.select_athlete(athlete);
    Ok(state.capture.state_json())
}

fn capture_validate(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = raw_form_from_json(form_param(params)?);
    match state.capture.prepare(&raw, today()) {
        Ok(payload) => Ok(json!({ "valid": true, "payload": payload })),
        Err(CaptureError::Validation(errors)) => {
            Ok(json!({ "valid": false, "fieldErrors": errors }))
        }
        Err(e) => Err(e.into()),
    }
}

fn capture_submit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = raw_form_from_json(form_param(params)?);
    let api = backend_api(&state.backend)?;
    match state.capture.submit(api, &raw, today()) {
        Ok(outcome) => {
            state.cache.invalidate(&outcome.invalidate);
            Ok(json!({
                "test": outcome.record,
                "created": outcome.created,
                "invalidated": outcome.invalidate.iter().map(|k| k.to_json()).collect::<Vec<_>>(),
                "message": outcome.message,
                "state": state.capture.state_json(),
            }))
        }
        Err(e) => {
            let mut herr = HandlerErr::from(e);
            let mut details = herr.details.take().unwrap_or_else(|| json!({}));
            if let Some(obj) = details.as_object_mut() {
                obj.insert("state".into(), state.capture.state_json());
            }
            herr.details = Some(details);
            Err(herr)
        }
    }
}

fn find_test(state: &mut AppState, evaluation_id: i64, test_id: i64) -> Result<TestRecord, HandlerErr> {
    let api = backend_api(&state.backend)?;
    let tests = state
        .cache
        .get_or_fetch(QueryKey::TestsByEvaluation(evaluation_id), || {
            let tests = api.list_evaluation_tests(evaluation_id)?;
            Ok::<_, HandlerErr>(json!({ "tests": tests }))
        })?;
    let records: Vec<TestRecord> = serde_json::from_value(tests["tests"].clone()).map_err(|e| HandlerErr {
        code: "bad_response",
        message: e.to_string(),
        details: None,
    })?;
    records.into_iter().find(|t| t.id == test_id).ok_or_else(|| HandlerErr {
        code: "not_found",
        message: format!("test {} not found in evaluation {}", test_id, evaluation_id),
        details: None,
    })
}

fn capture_begin_edit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let test_id = get_required_i64(params, "testId")?;
    let evaluation_id = match params.get("evaluationId").and_then(|v| v.as_i64()) {
        Some(id) => id,
        None => state.capture.session().evaluation_id().ok_or_else(|| HandlerErr {
            code: "no_evaluation",
            message: "open an evaluation first".to_string(),
            details: None,
        })?,
    };
    let record = find_test(state, evaluation_id, test_id)?;
    state.capture.begin_edit(&record);
    Ok(json!({ "test": record, "state": state.capture.state_json() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "capture.open" => capture_open(state, &req.params),
        "capture.state" => Ok(state.capture.state_json()),
        "capture.setTestType" => capture_set_test_type(state, &req.params),
        "capture.selectAthlete" => capture_select_athlete(state, &req.params),
        "capture.clearAthlete" => {
            state.capture.clear_athlete();
            Ok(state.capture.state_json())
        }
        "capture.validate" => capture_validate(state, &req.params),
        "capture.submit" => capture_submit(state, &req.params),
        "capture.beginEdit" => capture_begin_edit(state, &req.params),
        "capture.cancelEdit" => {
            state.capture.cancel_edit();
            Ok(state.capture.state_json())
        }
        _ => return None,
    };
    Some(respond(&req.id, result))
}
