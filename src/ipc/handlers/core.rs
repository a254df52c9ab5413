use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request, Session};
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "userId": state.session.user_id,
            "importInProgress": state.wizard.is_some()
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

    match db::open_db(&path) {
        Ok(conn) => {
            tracing::info!(workspace = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            // A half-finished upload belongs to the previous tenant.
            state.wizard = None;
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_session_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user_id = match req.params.get("userId") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => Some(s.to_string()),
            _ => return err(&req.id, "bad_params", "userId must be a non-empty string", None),
        },
    };
    let Some(raw_caps) = req.params.get("capabilities").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "capabilities must be an array", None);
    };
    let mut capabilities = HashSet::new();
    for c in raw_caps {
        let Some(s) = c.as_str() else {
            return err(&req.id, "bad_params", "capabilities must be strings", None);
        };
        capabilities.insert(s.trim().to_string());
    }

    let mut sorted: Vec<&String> = capabilities.iter().collect();
    sorted.sort();
    let result = json!({ "userId": user_id, "capabilities": sorted });
    tracing::debug!(user = ?user_id, count = capabilities.len(), "session set");
    state.session = Session {
        user_id,
        capabilities,
    };
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "session.set" => Some(handle_session_set(state, req)),
        _ => None,
    }
}
