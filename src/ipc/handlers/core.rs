use crate::config;
use crate::db;
use crate::events::{ChangeKind, Collection, EventLog};
use crate::ipc::error::{err, ok, respond, HandlerErr};
use crate::ipc::helpers::{grade_scale, require_db};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "changesCursor": state.events.cursor()
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
            info!(workspace = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            // Cursors from the previous workspace mean nothing here.
            state.events = EventLog::default();
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => {
            warn!(workspace = %path.display(), error = %e, "workspace open failed");
            err(&req.id, "db_open_failed", format!("{e:?}"), None)
        }
    }
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = require_db(state)
        .and_then(grade_scale)
        .map(|scale| json!({ "grading": scale }));
    respond(&req.id, result)
}

fn settings_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let Some(raw) = req.params.get("grading") else {
        return Err(HandlerErr::bad_params("missing grading"));
    };
    let scale = config::parse_grade_scale(raw)?;
    config::save_grade_scale(conn, &scale)
        .map_err(|e| HandlerErr::db_write("workspace_settings", e))?;
    info!(bands = scale.bands.len(), "grade scale updated");
    state
        .events
        .push(Collection::Settings, config::GRADING_KEY, ChangeKind::Updated);
    Ok(json!({ "grading": scale }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(respond(&req.id, settings_update(state, req))),
        _ => None,
    }
}
