use crate::api::http::HttpClubApi;
use crate::api::workspace::WorkspaceClubApi;
use crate::api::ClubApi;
use crate::ipc::helpers::{err, ok};
use crate::ipc::types::{AppState, Backend, Request};
use crate::options;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace_path = match &state.backend {
        Some(Backend::Workspace(w)) => w.path().map(|p| p.to_string_lossy().to_string()),
        _ => None,
    };
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "backend": state.backend.as_ref().map(|b| b.kind()),
            "backendTarget": state.backend.as_ref().map(|b| b.api().describe()),
            "workspacePath": workspace_path,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match WorkspaceClubApi::open(&path) {
        Ok(ws) => {
            state.set_backend(Backend::Workspace(ws));
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_server_connect(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(base_url) = req.params.get("baseUrl").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.baseUrl", None);
    };
    let token = req
        .params
        .get("token")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| state.config.token.clone());

    match HttpClubApi::new(base_url, token, state.config.timeout_secs) {
        Ok(http) => {
            let target = http.describe();
            state.set_backend(Backend::Http(http));
            ok(&req.id, json!({ "baseUrl": target }))
        }
        Err(e) => err(&req.id, "bad_params", format!("{e:#}"), None),
    }
}

fn handle_options_list(_state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, options::options_json())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "server.connect" => Some(handle_server_connect(state, req)),
        "options.list" => Some(handle_options_list(state, req)),
        _ => None,
    }
}
