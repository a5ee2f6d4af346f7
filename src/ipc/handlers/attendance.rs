use crate::attendance::{AttendanceError, AttendanceFilter};
use crate::cache::{self, Mutation};
use crate::ipc::helpers::{
    backend_api, get_optional_str, get_optional_time, get_required_date, get_required_i64, respond,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn attendance_load(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = get_required_date(params, "date")?;
    let filter = AttendanceFilter::new(
        date,
        get_optional_str(params, "search"),
        get_optional_str(params, "typeAthlete"),
    );
    let api = backend_api(&state.backend)?;
    let draft = state.attendance.refresh(api, filter)?;
    Ok(draft.to_json())
}

fn attendance_draft(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let draft = state.attendance.draft().ok_or(AttendanceError::NoDraft)?;
    Ok(draft.to_json())
}

fn attendance_set_present(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let athlete_id = get_required_i64(params, "athleteId")?;
    let Some(present) = params.get("isPresent").and_then(|v| v.as_bool()) else {
        return Err(HandlerErr::bad_params("missing/invalid isPresent"));
    };
    let draft = state.attendance.draft_mut()?;
    draft.set_present(athlete_id, present)?;
    Ok(json!({
        "athleteId": athlete_id,
        "entry": draft.entry(athlete_id),
        "counts": draft.counts(),
    }))
}

fn attendance_set_justification(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let athlete_id = get_required_i64(params, "athleteId")?;
    let text = params
        .get("justification")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let draft = state.attendance.draft_mut()?;
    draft.set_justification(athlete_id, text)?;
    Ok(json!({ "athleteId": athlete_id, "entry": draft.entry(athlete_id) }))
}

fn attendance_mark_all_present(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let draft = state.attendance.draft_mut()?;
    draft.mark_all_present();
    Ok(draft.to_json())
}

fn attendance_submit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let time = get_optional_time(params, "time")?;
    let api = backend_api(&state.backend)?;
    let summary = state.attendance.submit(api, time)?;

    let (date, counts) = match state.attendance.draft() {
        Some(d) => (Some(d.filter().date), Some(d.counts())),
        None => (None, None),
    };
    let keys = match date {
        Some(date) => cache::on_mutation(&Mutation::AttendanceSubmitted { date }),
        None => Default::default(),
    };
    state.cache.invalidate(&keys);
    Ok(json!({
        "createdCount": summary.created_count,
        "updatedCount": summary.updated_count,
        "message": summary.message,
        "counts": counts,
        "invalidated": keys.iter().map(|k| k.to_json()).collect::<Vec<_>>(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.load" => attendance_load(state, &req.params),
        "attendance.draft" => attendance_draft(state),
        "attendance.setPresent" => attendance_set_present(state, &req.params),
        "attendance.setJustification" => attendance_set_justification(state, &req.params),
        "attendance.markAllPresent" => attendance_mark_all_present(state),
        "attendance.submit" => attendance_submit(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
