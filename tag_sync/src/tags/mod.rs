//! Tag reconciliation for a single entity.
//!
//! ## What this does
//! - [`make_diff`] compares the tags a mapping wants (values read from the
//!   matched external record) with the tags the entity has, and produces a
//!   [`TagDiff`].
//! - [`apply_diff`] sends the diff to the directory: deletes first, then
//!   adds.
//!
//! ## Replace semantics
//! A changed value is written as "delete the key, then add it back with the
//! single external value". Any other values the key held are dropped, so
//! keys named in a mapping are owned by the sync and should not be edited by
//! hand.

mod apply;
mod diff;

use indexmap::IndexMap;

pub use apply::apply_diff;
pub use diff::{TagDiff, make_diff};

/// External attribute path -> internal tag key, in configuration order.
pub type FieldMapping = IndexMap<String, String>;
