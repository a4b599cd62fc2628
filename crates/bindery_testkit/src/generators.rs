//! Property-based test generators using proptest.

use crate::fixtures::product;
use bindery_core::{Fields, Filter};
use proptest::prelude::*;

/// Venues products are sold at. The in-store filter matches the first.
pub const VENUES: [&str; 3] = ["store", "online", "garbage"];

/// Strategy for a product venue.
pub fn venue_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(VENUES.to_vec())
}

/// Strategy for product field values.
///
/// Some products also carry a `discontinued` flag for exclusion filters.
pub fn product_strategy() -> impl Strategy<Value = Fields> {
    ("[a-z]{1,8}", venue_strategy(), any::<bool>(), any::<bool>()).prop_map(
        |(name, venue, flagged, discontinued)| {
            let mut fields = product(&name, venue);
            if flagged {
                fields.insert("discontinued".to_string(), discontinued.into());
            }
            fields
        },
    )
}

/// Strategy for a catalogue of up to `max` products.
pub fn catalogue_strategy(max: usize) -> impl Strategy<Value = Vec<Fields>> {
    prop::collection::vec(product_strategy(), 0..=max)
}

/// Strategy for a full-sync page size.
pub fn page_size_strategy() -> impl Strategy<Value = usize> {
    1usize..=16
}

/// Strategy for a filter over the product fields.
pub fn filter_strategy() -> impl Strategy<Value = Filter> {
    (venue_strategy(), any::<bool>()).prop_map(|(venue, exclude_discontinued)| {
        let filter = Filter::new().eq("venue", venue);
        if exclude_discontinued {
            filter.exclude("discontinued", true)
        } else {
            filter
        }
    })
}
