//! Membership predicates for bindings.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Equality-conjunction filter with an optional exclusion conjunction.
///
/// A record matches when every `equals` field holds the expected value and
/// the record does **not** satisfy all of the `excludes` fields. An absent
/// field compares equal to JSON `null`. An empty filter matches everything.
///
/// # Example
///
/// ```rust
/// use bindery_core::{Filter, Record};
///
/// let filter = Filter::new().eq("venue", "store").exclude("hidden", true);
/// assert!(filter.matches(&Record::new(1).with("venue", "store")));
/// assert!(!filter.matches(&Record::new(2).with("venue", "store").with("hidden", true)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Fields that must hold the given values.
    #[serde(default)]
    pub equals: BTreeMap<String, Value>,
    /// Records holding all of these values are excluded.
    #[serde(default)]
    pub excludes: BTreeMap<String, Value>,
}

impl Filter {
    /// Creates a filter that matches every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field == value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.insert(field.into(), value.into());
        self
    }

    /// Adds `field == value` to the exclusion conjunction.
    #[must_use]
    pub fn exclude(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.excludes.insert(field.into(), value.into());
        self
    }

    /// Returns true if the filter places no constraint.
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty() && self.excludes.is_empty()
    }

    /// Returns true if the record belongs to the filtered view.
    pub fn matches(&self, record: &Record) -> bool {
        let holds = |(field, expected): (&String, &Value)| {
            record.field(field).unwrap_or(&Value::Null) == expected
        };

        if !self.equals.iter().all(holds) {
            return false;
        }
        self.excludes.is_empty() || !self.excludes.iter().all(holds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(venue: &str) -> Record {
        Record::new(1).with("name", "t1").with("venue", venue)
    }

    #[test]
    fn empty_filter_matches_all() {
        assert!(Filter::new().is_empty());
        assert!(Filter::new().matches(&product("online")));
    }

    #[test]
    fn equality_conjunction() {
        let filter = Filter::new().eq("venue", "store").eq("name", "t1");
        assert!(filter.matches(&product("store")));
        assert!(!filter.matches(&product("online")));
    }

    #[test]
    fn missing_field_compares_as_null() {
        let filter = Filter::new().eq("archived", Value::Null);
        assert!(filter.matches(&product("store")));

        let filter = Filter::new().eq("archived", false);
        assert!(!filter.matches(&product("store")));
    }

    #[test]
    fn exclusion_requires_every_field() {
        let filter = Filter::new().exclude("venue", "store").exclude("name", "t2");
        // only one exclusion field holds, so the record stays in
        assert!(filter.matches(&product("store")));

        let filter = Filter::new().exclude("venue", "store");
        assert!(!filter.matches(&product("store")));
        assert!(filter.matches(&product("online")));
    }
}
