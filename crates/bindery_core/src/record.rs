//! Records mirrored from the authoritative store.

use crate::types::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field values of a record, ordered by field name.
pub type Fields = BTreeMap<String, Value>;

/// A serialized snapshot of one record.
///
/// Records are what bindings cache and what subscribers receive. Field
/// order is canonical, so two snapshots with the same content compare equal
/// regardless of how they were built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record id, unique within its record type.
    pub id: RecordId,
    /// Field values.
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    /// Creates a record with no fields.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Fields::new(),
        }
    }

    /// Creates a record from existing field values.
    pub fn with_fields(id: impl Into<RecordId>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Adds or replaces a field (builder style).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Adds or replaces a field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Returns a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Renders the record as a flat JSON object with an `id` member.
    ///
    /// A field literally named `id` is shadowed by the record id.
    pub fn to_value(&self) -> Value {
        let mut object: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        object.insert("id".to_string(), Value::from(self.id.as_u64()));
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_and_access() {
        let record = Record::new(1).with("name", "t1").with("venue", "store");
        assert_eq!(record.field("venue"), Some(&json!("store")));
        assert_eq!(record.field("missing"), None);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a = Record::new(1).with("a", 1).with("b", 2);
        let b = Record::new(1).with("b", 2).with("a", 1);
        assert_eq!(a, b);
    }

    #[test]
    fn to_value_is_flat() {
        let record = Record::new(3).with("name", "t3").with("id", "shadowed");
        assert_eq!(record.to_value(), json!({"id": 3, "name": "t3"}));
    }
}
