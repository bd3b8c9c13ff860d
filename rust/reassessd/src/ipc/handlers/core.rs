use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "exportDir": state.config.export_dir.to_string_lossy(),
            "pages": state.pages.iter().map(|p| p.def.name).collect::<Vec<_>>()
        }),
    )
}

fn handle_pages_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let pages: Vec<serde_json::Value> = state
        .pages
        .iter()
        .map(|p| {
            let mut v = p.def.describe();
            v["recordCount"] = json!(p.results.len());
            v
        })
        .collect();
    ok(&req.id, json!({ "pages": pages }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "pages.list" => Some(handle_pages_list(state, req)),
        _ => None,
    }
}
