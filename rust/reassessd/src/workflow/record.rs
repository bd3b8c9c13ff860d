use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use super::WorkflowError;

const ID_FIELD: &str = "id";

/// One displayed cell. Numbers stay numbers so totals and exported numeric
/// cells don't have to re-parse text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Number(_) => false,
            CellValue::Text(s) => s.trim().is_empty(),
        }
    }

    /// Text as shown in a table cell: integral numbers drop the `.0`.
    pub fn display(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(v) => format_number(*v),
        }
    }
}

pub(crate) fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Number(v as f64)
    }
}

/// A flat row: column name to display value, plus an id that is unique within
/// the owning result set. `fields` never holds an `id` key, since it would
/// shadow the real id once flattened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, CellValue>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<CellValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<CellValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.fields.get(field)
    }

    /// Display text of a field, empty when the field is absent.
    pub fn text(&self, field: &str) -> String {
        self.fields.get(field).map(|v| v.display()).unwrap_or_default()
    }

    pub fn has_value(&self, field: &str) -> bool {
        self.fields.get(field).map(|v| !v.is_blank()).unwrap_or(false)
    }

    /// Builds a record from a JSON object of field values. Strings and numbers
    /// are accepted; nulls are skipped; anything else is rejected. The id is
    /// assigned by the caller, so an `id` key is rejected too.
    pub fn from_json_fields(
        id: impl Into<String>,
        raw: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, WorkflowError> {
        let mut record = Record::new(id);
        for (key, value) in raw {
            if key == ID_FIELD {
                return Err(
                    WorkflowError::new("bad_value", "record ids are assigned by the sidecar")
                        .with_details(json!({ "field": key })),
                );
            }
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => record.set(key, s.as_str()),
                serde_json::Value::Number(n) => match n.as_f64() {
                    Some(v) => record.set(key, v),
                    None => {
                        return Err(WorkflowError::new("bad_value", "number out of range")
                            .with_details(json!({ "field": key })))
                    }
                },
                other => {
                    return Err(WorkflowError::new(
                        "bad_value",
                        "field values must be strings or numbers",
                    )
                    .with_details(json!({ "field": key, "value": other })))
                }
            }
        }
        Ok(record)
    }
}
