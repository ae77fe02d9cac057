//! Readers for external systems of record.
//!
//! A [`providers::RecordProvider`] returns every [`models::record::ExternalRecord`]
//! of a given type; the tag sync engine matches those records against
//! directory entities.

pub mod models;
pub mod providers;
