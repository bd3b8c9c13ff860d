use crate::backend::{interpret_api_response, PaymentRequest};
use crate::ipc::error::{api_err, err, ok};
use crate::ipc::params::{get_optional_number, get_optional_str};
use crate::ipc::types::{AppState, Request};
use crate::pages::APPLICATION;
use crate::workflow::AggregateScope;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::pages::append_response;

fn handle_add_subject(state: &mut AppState, req: &Request) -> Value {
    // A missing subject is not an error: the row is simply not added.
    let subject = match get_optional_str(&req.params, "subject") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e.response(&req.id),
    };
    let fee = match get_optional_number(&req.params, "fee") {
        Ok(Some(v)) => v,
        Ok(None) => state.config.fee_for(&subject),
        Err(e) => return e.response(&req.id),
    };

    let mut fields = Map::new();
    fields.insert("subject".into(), json!(subject.trim()));
    for key in ["subjectCode", "paper"] {
        match get_optional_str(&req.params, key) {
            Ok(Some(v)) => {
                fields.insert(key.into(), json!(v.trim()));
            }
            Ok(None) => {}
            Err(e) => return e.response(&req.id),
        }
    }
    fields.insert("fee".into(), json!(fee));

    let Some(page) = state.page_mut(APPLICATION.name) else {
        return err(&req.id, "not_found", "page not found", None);
    };
    append_response(page, req, &fields)
}

fn handle_pay(state: &mut AppState, req: &Request) -> Value {
    let AppState { pages, gateway, .. } = state;
    let Some(page) = pages.iter_mut().find(|p| p.def.name == APPLICATION.name) else {
        return err(&req.id, "not_found", "page not found", None);
    };
    let Some(student) = page.identity.as_ref() else {
        return err(&req.id, "no_student", "search for a student first", None);
    };
    if page.results.is_empty() {
        return err(&req.id, "nothing_to_pay", "add at least one subject", None);
    }
    let request = PaymentRequest {
        student_id: student.id.clone(),
        roll_no: student.text("rollNo"),
        amount: page.total(AggregateScope::All, "").unwrap_or(0.0),
        items: page.results.len(),
    };
    match gateway.submit(&request) {
        Ok(receipt) => {
            info!(
                reference = %receipt.reference,
                amount = receipt.amount,
                items = request.items,
                "payment submitted"
            );
            page.payment = Some(receipt.clone());
            ok(&req.id, json!(receipt))
        }
        Err(e) => {
            warn!(error = %e, "payment submission failed");
            api_err(&req.id, "payment_failed", e)
        }
    }
}

/// The provider's asynchronous answer, relayed by the UI as `{status, body}`.
/// A missing status means the provider could not be reached.
fn handle_payment_result(state: &mut AppState, req: &Request) -> Value {
    let status = match req.params.get("status") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_u64().and_then(|s| u16::try_from(s).ok()) {
            Some(s) => Some(s),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "status must be an HTTP status code",
                    Some(json!({ "status": v })),
                )
            }
        },
    };
    let body = match req.params.get("body") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let reference = state
        .page_mut(APPLICATION.name)
        .and_then(|p| p.payment.as_ref())
        .map(|r| r.reference.clone());
    match interpret_api_response(status, &body) {
        Ok(parsed) => ok(
            &req.id,
            json!({ "paid": true, "reference": reference, "response": parsed }),
        ),
        Err(e) => {
            warn!(error = %e, "payment reported failure");
            api_err(&req.id, "payment_failed", e)
        }
    }
}

fn handle_student(state: &mut AppState, req: &Request) -> Value {
    let Some(page) = state.page_mut(APPLICATION.name) else {
        return err(&req.id, "not_found", "page not found", None);
    };
    ok(
        &req.id,
        json!({ "student": page.identity, "payment": page.payment }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "application.addSubject" => Some(handle_add_subject(state, req)),
        "application.pay" => Some(handle_pay(state, req)),
        "application.paymentResult" => Some(handle_payment_result(state, req)),
        "application.student" => Some(handle_student(state, req)),
        _ => None,
    }
}
