use crate::ipc::error::{err, ok};
use crate::ipc::params::{get_optional_number, get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::pages::MARKS;
use crate::workflow::AggregateScope;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::warn;

use super::pages::{append_response, records_json};

fn handle_add_entry(state: &mut AppState, req: &Request) -> Value {
    let mut fields = Map::new();
    for key in ["rollNo", "student", "subject"] {
        match get_optional_str(&req.params, key) {
            Ok(Some(v)) => {
                fields.insert(key.into(), json!(v.trim()));
            }
            Ok(None) => {}
            Err(e) => return e.response(&req.id),
        }
    }
    for key in ["originalMarks", "revisedMarks"] {
        match get_optional_number(&req.params, key) {
            Ok(Some(v)) => {
                fields.insert(key.into(), json!(v));
            }
            Ok(None) => {}
            Err(e) => return e.response(&req.id),
        }
    }
    let Some(page) = state.page_mut(MARKS.name) else {
        return err(&req.id, "not_found", "page not found", None);
    };
    append_response(page, req, &fields)
}

fn handle_upload(state: &mut AppState, req: &Request) -> Value {
    let path = match get_required_str(&req.params, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e.response(&req.id),
    };
    let Some(page) = state.page_mut(MARKS.name) else {
        return err(&req.id, "not_found", "page not found", None);
    };
    match page.upload(&path) {
        Ok((summary, appended)) => {
            let mut result = records_json(page, "", AggregateScope::All);
            result["parsed"] = json!(summary.records.len());
            result["appended"] = json!(appended);
            result["rowsSkipped"] = json!(summary.rows_skipped);
            result["unmappedHeaders"] = json!(summary.unmapped_headers);
            ok(&req.id, result)
        }
        Err(e) => {
            let message = format!("{e:#}");
            warn!(path = %path.to_string_lossy(), error = %message, "upload failed");
            err(
                &req.id,
                "upload_failed",
                message,
                Some(json!({ "path": path.to_string_lossy() })),
            )
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "marks.addEntry" => Some(handle_add_entry(state, req)),
        "marks.upload" => Some(handle_upload(state, req)),
        _ => None,
    }
}
