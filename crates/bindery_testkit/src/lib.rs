//! # Bindery Testkit
//!
//! Test utilities for Bindery.
//!
//! This crate provides:
//! - Product fixtures and a recording listener
//! - A harness wiring a record store, a shared cache and dispatchers that
//!   stand in for separate processes
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bindery_testkit::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn tracks_store_products() {
//!     let harness = Harness::new();
//!     let binding = harness.dispatcher.bind(in_store());
//!     assert_eq!(binding.all().unwrap().len(), 2);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
