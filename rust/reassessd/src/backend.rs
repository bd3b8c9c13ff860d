//! Collaborators the pages call into: the query service behind every Search
//! button, and the payment provider behind the application fee.
//!
//! Only in-memory stand-ins live here. A real deployment swaps in its own
//! implementations of [`QueryBackend`] and [`PaymentGateway`].

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::workflow::{FilterCriteria, Record};

pub const NETWORK_ERROR: &str = "Network error";
pub const API_REQUEST_FAILED: &str = "API request failed";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn network() -> Self {
        Self {
            status: None,
            message: NETWORK_ERROR.to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(s) => write!(f, "{} (status {})", self.message, s),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Turns a raw HTTP-style response into a parsed body or an [`ApiError`].
///
/// `status == None` means no response arrived at all. A non-2xx response takes
/// its message from the body's `message` (or `error`) field; an unparsable or
/// message-less body falls back to a generic one.
pub fn interpret_api_response(status: Option<u16>, body: &str) -> Result<Value, ApiError> {
    let Some(status) = status else {
        return Err(ApiError::network());
    };
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    if (200..300).contains(&status) {
        return Ok(parsed.unwrap_or(Value::Null));
    }
    let message = parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
        })
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(API_REQUEST_FAILED)
        .to_string();
    Err(ApiError {
        status: Some(status),
        message,
    })
}

pub trait QueryBackend {
    /// Rows for `page` matching the submitted criteria, in display order.
    fn query(&self, page: &str, criteria: &FilterCriteria) -> Result<Vec<Record>, ApiError>;

    /// Looks up one student from the identity fields of a criteria form.
    fn resolve_student(&self, criteria: &FilterCriteria) -> Result<Option<Record>, ApiError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub student_id: String,
    pub roll_no: String,
    pub amount: f64,
    pub items: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub reference: String,
    pub amount: f64,
    pub message: String,
    pub dismiss_after_ms: u64,
}

pub trait PaymentGateway {
    fn submit(&self, request: &PaymentRequest) -> Result<PaymentReceipt, ApiError>;
}

/// Always approves. Stands in for the redirect to an external provider.
pub struct SimulatedGateway {
    pub dismiss_after_ms: u64,
}

impl PaymentGateway for SimulatedGateway {
    fn submit(&self, request: &PaymentRequest) -> Result<PaymentReceipt, ApiError> {
        let reference = format!("PAY-{}", Uuid::new_v4().simple());
        debug!(reference = %reference, amount = request.amount, "simulated payment approved");
        Ok(PaymentReceipt {
            reference,
            amount: request.amount,
            message: "Payment successful".to_string(),
            dismiss_after_ms: self.dismiss_after_ms,
        })
    }
}

/// Fixed sample rows answering every query from memory.
pub struct SampleBackend {
    students: Vec<Record>,
    rows: Vec<(&'static str, Vec<Record>)>,
}

impl SampleBackend {
    pub fn new() -> Self {
        Self {
            students: sample_students(),
            rows: vec![("marks", sample_marks()), ("report", sample_report())],
        }
    }
}

impl Default for SampleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryBackend for SampleBackend {
    fn query(&self, page: &str, criteria: &FilterCriteria) -> Result<Vec<Record>, ApiError> {
        let rows = self
            .rows
            .iter()
            .find(|(name, _)| *name == page)
            .map(|(_, rows)| rows.as_slice())
            .unwrap_or(&[]);
        Ok(rows
            .iter()
            .filter(|r| criteria_match(r, criteria))
            .cloned()
            .collect())
    }

    fn resolve_student(&self, criteria: &FilterCriteria) -> Result<Option<Record>, ApiError> {
        let roll_no = criteria.non_blank("rollNo");
        let name = criteria.non_blank("studentName").map(str::to_lowercase);
        if roll_no.is_none() && name.is_none() {
            return Ok(None);
        }
        Ok(self
            .students
            .iter()
            .find(|s| {
                roll_no.map(|r| s.text("rollNo") == r).unwrap_or(true)
                    && name
                        .as_deref()
                        .map(|n| s.text("student").to_lowercase() == n)
                        .unwrap_or(true)
            })
            .cloned())
    }
}

/// Every non-blank criterion must equal (ignoring case) the row's field of the
/// same name. Criteria naming fields the row doesn't carry are ignored.
fn criteria_match(row: &Record, criteria: &FilterCriteria) -> bool {
    criteria.iter().all(|(field, value)| {
        let value = value.trim();
        if value.is_empty() || row.get(field).is_none() {
            return true;
        }
        row.text(field).eq_ignore_ascii_case(value)
    })
}

fn sample_students() -> Vec<Record> {
    vec![
        Record::new("S-1001")
            .with("rollNo", "1001")
            .with("student", "John Doe")
            .with("course", "B.Sc")
            .with("semester", "3"),
        Record::new("S-1002")
            .with("rollNo", "1002")
            .with("student", "Jane Smith")
            .with("course", "B.Sc")
            .with("semester", "3"),
        Record::new("S-1003")
            .with("rollNo", "1003")
            .with("student", "Arjun Mehta")
            .with("course", "B.Com")
            .with("semester", "5"),
    ]
}

fn sample_marks() -> Vec<Record> {
    let row = |id: &str, roll: &str, student: &str, subject: &str, before: f64, after: f64| {
        Record::new(id)
            .with("session", "2024-25")
            .with("semester", "3")
            .with("course", "B.Sc")
            .with("rollNo", roll)
            .with("student", student)
            .with("subject", subject)
            .with("originalMarks", before)
            .with("revisedMarks", after)
    };
    vec![
        row("M-1", "1001", "John Doe", "Math", 38.0, 45.0),
        row("M-2", "1002", "Jane Smith", "Physics", 41.0, 41.0),
        row("M-3", "1001", "John Doe", "Chemistry", 29.0, 36.0),
    ]
}

/// Rows the report page shows before any search runs.
pub fn sample_report() -> Vec<Record> {
    let row = |id: &str, student: &str, subject: &str, status: &str, fee: f64| {
        Record::new(id)
            .with("session", "2024-25")
            .with("student", student)
            .with("subject", subject)
            .with("status", status)
            .with("fee", fee)
    };
    vec![
        row("1", "John Doe", "Math", "Completed", 100.0),
        row("2", "Jane Smith", "Physics", "Pending", 80.0),
        row("3", "Arjun Mehta", "Accountancy", "Completed", 100.0),
        row("4", "Jane Smith", "Chemistry", "Rejected", 80.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_returns_body() {
        let v = interpret_api_response(Some(200), r#"{"rows":[]}"#).expect("ok");
        assert_eq!(v, json!({ "rows": [] }));
        assert_eq!(interpret_api_response(Some(204), "").expect("ok"), Value::Null);
    }

    #[test]
    fn failure_message_comes_from_body() {
        let e = interpret_api_response(Some(422), r#"{"message":"Roll number not found"}"#)
            .expect_err("fail");
        assert_eq!(e.status, Some(422));
        assert_eq!(e.message, "Roll number not found");
        let e = interpret_api_response(Some(500), r#"{"error":"boom"}"#).expect_err("fail");
        assert_eq!(e.message, "boom");
    }

    #[test]
    fn failure_falls_back_to_generic_messages() {
        let e = interpret_api_response(Some(502), "<html>bad gateway</html>").expect_err("fail");
        assert_eq!(e.message, API_REQUEST_FAILED);
        let e = interpret_api_response(Some(400), r#"{"message":"  "}"#).expect_err("fail");
        assert_eq!(e.message, API_REQUEST_FAILED);
        let e = interpret_api_response(None, "").expect_err("fail");
        assert_eq!(e.message, NETWORK_ERROR);
        assert_eq!(e.status, None);
    }

    #[test]
    fn resolve_student_by_roll_or_name() {
        let backend = SampleBackend::new();
        let mut c = FilterCriteria::new(&["rollNo", "studentName"]);
        assert!(backend.resolve_student(&c).expect("query").is_none());
        c.set_field("rollNo", "1002").expect("set");
        let s = backend.resolve_student(&c).expect("query").expect("found");
        assert_eq!(s.text("student"), "Jane Smith");

        let mut c = FilterCriteria::new(&["rollNo", "studentName"]);
        c.set_field("studentName", "john doe").expect("set");
        let s = backend.resolve_student(&c).expect("query").expect("found");
        assert_eq!(s.id, "S-1001");
    }

    #[test]
    fn query_filters_on_known_fields_only() {
        let backend = SampleBackend::new();
        let mut c = FilterCriteria::new(&["session", "subject", "examType"]);
        c.set_field("subject", "math").expect("set");
        c.set_field("examType", "anything").expect("set");
        let rows = backend.query("marks", &c).expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "M-1");
        assert!(backend.query("unknown", &c).expect("query").is_empty());
    }
}
