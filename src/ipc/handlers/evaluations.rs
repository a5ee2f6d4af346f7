use crate::cache::{self, Mutation, QueryKey};
use crate::evaluation::evaluation_from_form;
use crate::ipc::helpers::{backend_api, get_required_i64, respond, today, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::schema::raw_form_from_json;
use serde_json::json;

fn evaluations_list(state: &mut AppState, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let api = backend_api(&state.backend)?;
    state.cache.get_or_fetch(QueryKey::Evaluations, || {
        let list = api.list_evaluations()?;
        Ok(json!({ "evaluations": list }))
    })
}

fn evaluations_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let evaluation_id = get_required_i64(params, "evaluationId")?;
    let api = backend_api(&state.backend)?;
    state
        .cache
        .get_or_fetch(QueryKey::Evaluation(evaluation_id), || {
            Ok(json!(api.get_evaluation(evaluation_id)?))
        })
}

fn evaluations_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let api = backend_api(&state.backend)?;
    let raw = raw_form_from_json(params);
    let input = evaluation_from_form(&raw, state.config.user_id, today(), true)
        .map_err(|e| HandlerErr::validation(&e))?;
    let created = api.create_evaluation(&input)?;
    log::info!("evaluation {} created ({})", created.id, created.date);

    let keys = cache::on_mutation(&Mutation::EvaluationCreated);
    state.cache.invalidate(&keys);
    Ok(json!({
        "evaluation": created,
        "invalidated": keys.iter().map(|k| k.to_json()).collect::<Vec<_>>(),
    }))
}

fn evaluations_update(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let evaluation_id = get_required_i64(params, "evaluationId")?;
    let api = backend_api(&state.backend)?;
    let raw = raw_form_from_json(params);
    let input = evaluation_from_form(&raw, state.config.user_id, today(), false)
        .map_err(|e| HandlerErr::validation(&e))?;
    let updated = api.update_evaluation(evaluation_id, &input)?;

    let keys = cache::on_mutation(&Mutation::EvaluationUpdated { evaluation_id });
    state.cache.invalidate(&keys);
    Ok(json!({
        "evaluation": updated,
        "invalidated": keys.iter().map(|k| k.to_json()).collect::<Vec<_>>(),
    }))
}

fn evaluations_tests(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let evaluation_id = get_required_i64(params, "evaluationId")?;
    let api = backend_api(&state.backend)?;
    state
        .cache
        .get_or_fetch(QueryKey::TestsByEvaluation(evaluation_id), || {
            let tests = api.list_evaluation_tests(evaluation_id)?;
            Ok(json!({ "tests": tests }))
        })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "evaluations.list" => evaluations_list(state, &req.params),
        "evaluations.get" => evaluations_get(state, &req.params),
        "evaluations.create" => evaluations_create(state, &req.params),
        "evaluations.update" => evaluations_update(state, &req.params),
        "evaluations.tests" => evaluations_tests(state, &req.params),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
