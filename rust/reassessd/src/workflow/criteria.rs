use serde_json::json;

use super::WorkflowError;

/// Current values of a page's filter form. The key set is fixed when the page
/// is created; every key starts out empty.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriteria {
    values: Vec<(String, String)>,
}

impl FilterCriteria {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            values: fields
                .iter()
                .map(|f| (f.to_string(), String::new()))
                .collect(),
        }
    }

    /// Any value is accepted; only the field name is checked.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> Result<(), WorkflowError> {
        if let Some((_, slot)) = self.values.iter_mut().find(|(k, _)| k == name) {
            *slot = value.into();
            return Ok(());
        }
        Err(
            WorkflowError::new("unknown_field", format!("unknown field: {}", name))
                .with_details(json!({ "field": name, "fields": self.field_names() })),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed value, `None` when the field is unknown or blank.
    pub fn non_blank(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.values.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn snapshot(&self) -> serde_json::Map<String, serde_json::Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect()
    }
}
