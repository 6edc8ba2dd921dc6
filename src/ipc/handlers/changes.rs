use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const CHANGES_DEFAULT_LIMIT: u64 = 200;
const CHANGES_MAX_LIMIT: u64 = 1000;

fn handle_changes_since(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cursor = match req.params.get("cursor") {
        None => 0,
        Some(v) if v.is_null() => 0,
        Some(v) => match v.as_u64() {
            Some(n) => n,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "cursor must be a non-negative integer",
                    Some(json!({ "cursor": v })),
                )
            }
        },
    };
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(CHANGES_DEFAULT_LIMIT)
        .clamp(1, CHANGES_MAX_LIMIT);

    let page = state.events.since(cursor, limit as usize);
    ok(&req.id, json!(page))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "changes.since" => Some(handle_changes_since(state, req)),
        _ => None,
    }
}
