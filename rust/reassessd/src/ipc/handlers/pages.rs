use crate::ipc::error::{api_err, err, ok, workflow_err};
use crate::ipc::params::{get_object, get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::pages::{page_def, PageSession, SearchOutcome};
use crate::workflow::{AggregateScope, Record};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::warn;

/// Rows, visible count and running total as the table footer shows them.
pub fn records_json(page: &PageSession, term: &str, scope: AggregateScope) -> Value {
    let visible: Vec<&Record> = page.view(term).collect();
    json!({
        "records": visible,
        "visible": visible.len(),
        "count": page.results.len(),
        "total": page.total(scope, term),
        "totalScope": scope.as_str(),
    })
}

fn handle_criteria_set(page: &mut PageSession, req: &Request) -> Value {
    let field = match get_required_str(&req.params, "field") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let value = match get_optional_str(&req.params, "value") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = page.set_criterion(&field, &value) {
        return workflow_err(&req.id, e);
    }
    ok(&req.id, json!({ "criteria": page.criteria.snapshot() }))
}

fn handle_criteria_get(page: &mut PageSession, req: &Request) -> Value {
    ok(&req.id, json!({ "criteria": page.criteria.snapshot() }))
}

fn handle_search(state: &mut AppState, name: &str, req: &Request) -> Value {
    let AppState { pages, backend, .. } = state;
    let Some(page) = pages.iter_mut().find(|p| p.def.name == name) else {
        return err(&req.id, "not_found", "page not found", None);
    };
    match page.search(&**backend) {
        Ok(SearchOutcome::Resolved { student }) => ok(
            &req.id,
            json!({
                "criteria": page.criteria.snapshot(),
                "student": student,
            }),
        ),
        Ok(SearchOutcome::Replaced { rows }) => ok(
            &req.id,
            json!({
                "criteria": page.criteria.snapshot(),
                "rows": rows,
                "records": page.results.records(),
            }),
        ),
        Err(e) => {
            warn!(page = name, error = %e, "search failed");
            api_err(&req.id, "search_failed", e)
        }
    }
}

fn handle_records(page: &mut PageSession, req: &Request) -> Value {
    let term = match get_optional_str(&req.params, "term") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e.response(&req.id),
    };
    let scope = match get_optional_str(&req.params, "totalScope") {
        Ok(v) => match AggregateScope::parse(v.as_deref()) {
            Ok(s) => s,
            Err(e) => return workflow_err(&req.id, e),
        },
        Err(e) => return e.response(&req.id),
    };
    ok(&req.id, records_json(page, &term, scope))
}

pub fn append_response(
    page: &mut PageSession,
    req: &Request,
    fields: &serde_json::Map<String, Value>,
) -> Value {
    match page.append(fields) {
        Ok(record) => ok(
            &req.id,
            json!({
                "added": record.is_some(),
                "record": record,
                "count": page.results.len(),
                "total": page.total(AggregateScope::All, ""),
            }),
        ),
        Err(e) => workflow_err(&req.id, e),
    }
}

fn handle_append(page: &mut PageSession, req: &Request) -> Value {
    let fields = match get_object(&req.params, "fields") {
        Ok(v) => v.clone(),
        Err(e) => return e.response(&req.id),
    };
    append_response(page, req, &fields)
}

fn handle_export(state: &mut AppState, name: &str, req: &Request) -> Value {
    let out_dir = match get_optional_str(&req.params, "outDir") {
        Ok(Some(d)) if !d.trim().is_empty() => PathBuf::from(d.trim()),
        Ok(_) => state.config.export_dir.clone(),
        Err(e) => return e.response(&req.id),
    };
    let term = match get_optional_str(&req.params, "term") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e.response(&req.id),
    };
    let Some(page) = state.page_mut(name) else {
        return err(&req.id, "not_found", "page not found", None);
    };
    match page.export(&out_dir, &term) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": summary.path.to_string_lossy(),
                "fileName": summary
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string()),
                "sheetName": summary.sheet_name,
                "rowsExported": summary.rows_exported,
                "columns": summary.columns,
            }),
        ),
        Err(e) => {
            let message = format!("{e:#}");
            warn!(page = name, error = %message, "export failed");
            err(
                &req.id,
                "export_failed",
                message,
                Some(json!({ "outDir": out_dir.to_string_lossy() })),
            )
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (prefix, op) = req.method.split_once('.')?;
    let def = page_def(prefix)?;
    let name = def.name;
    match op {
        "search" => return Some(handle_search(state, name, req)),
        "export" => return Some(handle_export(state, name, req)),
        _ => {}
    }
    let handler: fn(&mut PageSession, &Request) -> Value = match op {
        "criteria.set" => handle_criteria_set,
        "criteria.get" => handle_criteria_get,
        "records" => handle_records,
        "append" => handle_append,
        _ => return None,
    };
    let page = state.page_mut(name)?;
    Some(handler(page, req))
}
