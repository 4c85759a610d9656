//! # RowDB Testkit
//!
//! Test utilities for RowDB.
//!
//! This crate provides:
//! - A ready-made sample schema and database fixture
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rowdb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_sample_db(|db| {
//!         let companies = db.table("Company").unwrap();
//!         // ... test operations
//!     });
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
