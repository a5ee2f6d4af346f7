use crate::api::workspace::NewAthlete;
use crate::cache::QueryKey;
use crate::ipc::helpers::{backend_api, get_optional_str, get_required_i64, respond, HandlerErr};
use crate::ipc::types::{AppState, Backend, Request};
use crate::model::AthleteQuery;
use serde_json::json;

const ATHLETES_LIST_MAX_LIMIT: u32 = 500;

fn athletes_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let api = backend_api(&state.backend)?;
    let page = params.get("page").and_then(|v| v.as_u64()).unwrap_or(1);
    let limit = params.get("limit").and_then(|v| v.as_u64()).unwrap_or(50);
    if page == 0 || limit == 0 || limit > ATHLETES_LIST_MAX_LIMIT as u64 {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("page must be >= 1 and limit between 1 and {}", ATHLETES_LIST_MAX_LIMIT),
            details: Some(json!({ "page": page, "limit": limit })),
        });
    }
    let query = AthleteQuery {
        page: page as u32,
        limit: limit as u32,
        search: get_optional_str(params, "search"),
        type_athlete: get_optional_str(params, "typeAthlete"),
        is_active: params.get("isActive").and_then(|v| v.as_bool()),
    };
    let result = api.list_athletes(&query)?;
    Ok(json!({ "items": result.items, "total": result.total }))
}

fn athletes_import(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(Backend::Workspace(ws)) = &state.backend else {
        return Err(HandlerErr {
            code: "not_supported",
            message: "roster import needs a local workspace".to_string(),
            details: None,
        });
    };
    let Some(raw) = params.get("athletes") else {
        return Err(HandlerErr::bad_params("missing athletes[]"));
    };
    let athletes: Vec<NewAthlete> = serde_json::from_value(raw.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid athletes[]: {}", e)))?;
    let created = ws.import_athletes(&athletes)?;
    log::info!("imported {} athletes", created.len());
    Ok(json!({ "imported": created.len(), "athletes": created }))
}

fn athletes_stats(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let athlete_id = get_required_i64(params, "athleteId")?;
    let api = backend_api(&state.backend)?;
    state
        .cache
        .get_or_fetch(QueryKey::AthleteStats(athlete_id), || {
            let stats = api.athlete_stats(athlete_id)?;
            Ok(json!(stats))
        })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "athletes.list" => athletes_list(state, &req.params),
        "athletes.import" => athletes_import(state, &req.params),
        "athletes.stats" => athletes_stats(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
