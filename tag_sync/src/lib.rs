//! Keeps tags on directory entities in line with attributes of matching
//! records in an external system of record.

#![deny(missing_docs)]

pub mod audit;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod providers;
pub mod query;
pub mod sync;
pub mod tags;
