//! Error types shared across the sync engine.
//!
//! Severity follows granularity: [`crate::config::ConfigError`] stops the
//! program before a cycle starts, [`FetchError`] fails one mapping,
//! [`MutationError`] fails one entity, and [`TimestampResolutionError`] only
//! downgrades an incremental sync to a full one.

use std::fmt;

use record_provider::providers::ProviderError;
use thiserror::Error;

/// Errors raised by the entity directory client.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("directory request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The directory answered with a non-success status.
    #[error("directory returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("could not decode directory response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The GraphQL layer reported errors.
    #[error("graphql errors: {}", .messages.join("; "))]
    GraphQl {
        /// Error messages, in response order.
        messages: Vec<String>,
    },

    /// A tagging mutation completed but reported semantic errors.
    #[error("tagging errors: {}", .messages.join("; "))]
    Tagging {
        /// Error messages, in response order.
        messages: Vec<String>,
    },

    /// The response was well-formed JSON but lacked the expected data.
    #[error("unexpected directory response: {0}")]
    Malformed(String),
}

/// Fetching the data a mapping works on failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The system of record could not be read.
    #[error("fetching external records failed: {0}")]
    Records(#[source] ProviderError),

    /// The directory search failed part way through.
    #[error("fetching entities failed: {0}")]
    Entities(#[source] DirectoryError),
}

/// Which tag mutation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Removing tag keys.
    Delete,
    /// Adding tags.
    Add,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationKind::Delete => "deleting",
            MutationKind::Add => "adding",
        })
    }
}

/// One failed tag mutation on one entity.
#[derive(Debug, Error)]
#[error("{kind} tags on entity {name} ({guid}) failed: {source}")]
pub struct MutationError {
    /// The mutation that failed.
    pub kind: MutationKind,
    /// Entity guid.
    pub guid: String,
    /// Entity name.
    pub name: String,
    /// Underlying directory error.
    #[source]
    pub source: DirectoryError,
}

/// The last successful sync time could not be determined.
#[derive(Debug, Error)]
pub enum TimestampResolutionError {
    /// Incremental sync needs the audit trail, which needs events.
    #[error("events must be enabled to use the last update timestamp")]
    EventsDisabled,

    /// The audit trail query failed.
    #[error("query for last update failed: {0}")]
    Query(#[source] DirectoryError),
}
