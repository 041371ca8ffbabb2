use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::rls::resource::{ResourceType, SYSTEM_FIELDS};

/// Errors that can occur while turning API input into a Record
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("System field '{0}' cannot be set via API input")]
    SystemFieldNotAllowed(String),
    #[error("Unknown field '{field}' for {resource}")]
    UnknownField { field: String, resource: String },
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
}

/// A dynamic row: field name to JSON value.
///
/// Shape is validated once against the resource's field list at the API
/// boundary, so the policy core can assume a field lookup either succeeds
/// or is cleanly absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Wrap a stored row (system fields allowed)
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(RecordError::InvalidJson("Expected JSON object".to_string())),
        }
    }

    /// Build from request input: rejects system fields and fields the
    /// resource does not declare
    pub fn from_api_input(resource: ResourceType, value: Value) -> Result<Self, RecordError> {
        let record = Self::from_value(value)?;
        for key in record.fields.keys() {
            if SYSTEM_FIELDS.contains(&key.as_str()) {
                return Err(RecordError::SystemFieldNotAllowed(key.clone()));
            }
            if !resource.has_field(key) {
                return Err(RecordError::UnknownField {
                    field: key.clone(),
                    resource: resource.to_string(),
                });
            }
        }
        Ok(record)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) -> &mut Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Record id rendered as a string (ids may be stored as text or numbers)
    pub fn id(&self) -> Option<String> {
        match self.fields.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Overlay `changes` onto this record, returning the merged result
    pub fn merged_with(&self, changes: &Record) -> Record {
        let mut merged = self.clone();
        for (k, v) in &changes.fields {
            merged.fields.insert(k.clone(), v.clone());
        }
        merged
    }

    /// Assign id and timestamps for a newly created row
    pub fn stamp_created(&mut self, id: String) {
        let now = Value::String(Utc::now().to_rfc3339());
        self.fields.insert("id".into(), Value::String(id));
        self.fields.insert("created_at".into(), now.clone());
        self.fields.insert("updated_at".into(), now);
    }

    pub fn stamp_updated(&mut self) {
        self.fields
            .insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn to_api_output_array(records: Vec<Record>) -> Value {
        Value::Array(records.into_iter().map(Record::into_value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_input_rejects_system_fields() {
        let err = Record::from_api_input(ResourceType::Invoices, json!({ "id": "x", "amount": 10 })).unwrap_err();
        assert!(matches!(err, RecordError::SystemFieldNotAllowed(ref f) if f == "id"));
    }

    #[test]
    fn api_input_rejects_unknown_fields() {
        let err = Record::from_api_input(ResourceType::Invoices, json!({ "colour": "red" })).unwrap_err();
        assert!(matches!(err, RecordError::UnknownField { .. }));
    }

    #[test]
    fn api_input_rejects_non_objects() {
        assert!(Record::from_api_input(ResourceType::Invoices, json!([1, 2])).is_err());
    }

    #[test]
    fn id_renders_numbers_and_strings() {
        assert_eq!(Record::from_value(json!({ "id": 7 })).unwrap().id(), Some("7".to_string()));
        assert_eq!(Record::from_value(json!({ "id": "w1" })).unwrap().id(), Some("w1".to_string()));
        assert_eq!(Record::from_value(json!({ "id": null })).unwrap().id(), None);
    }

    #[test]
    fn merge_overlays_changes() {
        let base = Record::from_value(json!({ "id": "i1", "status": "unpaid", "amount": 10 })).unwrap();
        let changes = Record::from_value(json!({ "status": "paid" })).unwrap();
        let merged = base.merged_with(&changes);
        assert_eq!(merged.get("status"), Some(&json!("paid")));
        assert_eq!(merged.get("amount"), Some(&json!(10)));
    }

    #[test]
    fn stamping_sets_system_fields() {
        let mut r = Record::new();
        r.stamp_created("abc".into());
        assert_eq!(r.id().as_deref(), Some("abc"));
        assert!(r.get("created_at").is_some());
        assert_eq!(r.get("created_at"), r.get("updated_at"));
    }
}
