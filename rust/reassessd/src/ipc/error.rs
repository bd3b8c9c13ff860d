use serde_json::json;

use crate::backend::ApiError;
use crate::workflow::WorkflowError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn workflow_err(id: &str, e: WorkflowError) -> serde_json::Value {
    err(id, &e.code, e.message, e.details)
}

pub fn api_err(id: &str, code: &str, e: ApiError) -> serde_json::Value {
    let details = e.status.map(|s| json!({ "status": s }));
    err(id, code, e.message, details)
}
