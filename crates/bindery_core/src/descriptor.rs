//! Serializable binding descriptions.
//!
//! A descriptor is everything another process needs to materialize a
//! binding: its identity, its filter, its cache lifetimes and, optionally,
//! where its changes are delivered. Descriptors are what the
//! [`BindingRegistry`](crate::BindingRegistry) stores.

use crate::config::BindingConfig;
use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Escapes `%` and `:` in one part of a cache key.
///
/// `:` separates key parts, so a record type such as `app:Product` must not
/// read as the type `app` followed by a name.
pub fn key_part(part: &str) -> Cow<'_, str> {
    if part.contains([':', '%']) {
        Cow::Owned(part.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(part)
    }
}

/// Returns the identity of binding `name` over `record_type`.
pub fn binding_key(record_type: &str, name: &str) -> String {
    format!("{}:{}", key_part(record_type), key_part(name))
}

/// Where a binding's changes go: a subscriber event name and its groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryRoute {
    /// Event name subscribers listen on.
    pub event: String,
    /// Subscriber groups receiving the event.
    pub groups: Vec<String>,
}

impl DeliveryRoute {
    /// Creates a route.
    pub fn new<I, S>(event: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event: event.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// Identity and parameters of a binding.
///
/// `record_type` and `name` are escaped with [`key_part`] wherever they
/// become part of a cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingDescriptor {
    /// Record type the binding mirrors.
    pub record_type: String,
    /// Binding name, unique within the record type.
    pub name: String,
    /// Membership predicate.
    #[serde(default)]
    pub filter: Filter,
    /// Delivery route for change notifications.
    #[serde(default)]
    pub route: Option<DeliveryRoute>,
    /// Cache lifetimes.
    #[serde(default)]
    pub config: BindingConfig,
}

impl BindingDescriptor {
    /// Creates a descriptor matching every record of the type.
    pub fn new(record_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            name: name.into(),
            filter: Filter::default(),
            route: None,
            config: BindingConfig::default(),
        }
    }

    /// Creates a descriptor named after its record type.
    pub fn for_type(record_type: impl Into<String>) -> Self {
        let record_type = record_type.into();
        Self::new(record_type.clone(), record_type)
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the delivery route.
    #[must_use]
    pub fn with_route(mut self, route: DeliveryRoute) -> Self {
        self.route = Some(route);
        self
    }

    /// Sets the cache lifetimes.
    #[must_use]
    pub fn with_config(mut self, config: BindingConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns `"{record_type}:{name}"`, the binding's identity.
    pub fn key(&self) -> String {
        binding_key(&self.record_type, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_and_defaults() {
        let descriptor = BindingDescriptor::for_type("Product");
        assert_eq!(descriptor.name, "Product");
        assert_eq!(descriptor.key(), "Product:Product");
        assert!(descriptor.filter.is_empty());
        assert!(descriptor.route.is_none());
    }

    #[test]
    fn builder() {
        let descriptor = BindingDescriptor::new("Product", "store")
            .with_filter(Filter::new().eq("venue", "store"))
            .with_route(DeliveryRoute::new("products", ["products-store"]));

        assert_eq!(descriptor.key(), "Product:store");
        let route = descriptor.route.unwrap();
        assert_eq!(route.event, "products");
        assert_eq!(route.groups, vec!["products-store".to_string()]);
    }

    #[test]
    fn separator_in_parts_is_escaped() {
        assert_eq!(key_part("store"), "store");
        assert_eq!(key_part("app:Product"), "app%3AProduct");
        assert_eq!(key_part("50%:off"), "50%25%3Aoff");

        let nested = BindingDescriptor::new("app:Product", "store");
        let flat = BindingDescriptor::new("app", "Product:store");
        assert_eq!(nested.key(), "app%3AProduct:store");
        assert_ne!(nested.key(), flat.key());
    }

    #[test]
    fn missing_optional_fields_deserialize() {
        let descriptor: BindingDescriptor =
            serde_json::from_str(r#"{"record_type":"Product","name":"all"}"#).unwrap();
        assert_eq!(descriptor, BindingDescriptor::new("Product", "all"));
    }
}
