//! Entity directory abstraction.
//!
//! The sync engine reads entities and writes tags through the
//! [`EntityDirectory`] trait, and looks up its own history through
//! [`AuditTrail`]. [`graphql::GraphQlDirectory`] implements both against the
//! directory's GraphQL API; tests substitute in-memory fakes.

pub mod graphql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::DirectoryError,
    models::{EntitySearchPage, Tag},
};

pub use graphql::{DirectoryConfig, EventHistory, GraphQlDirectory};

/// Search and tagging operations on the internal entity directory.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Fetches one page of entities matching `query`.
    ///
    /// `cursor` is `None` for the first page and the previous page's
    /// `next_cursor` afterwards.
    async fn search(
        &self,
        query: &str,
        cursor: Option<&str>,
    ) -> Result<EntitySearchPage, DirectoryError>;

    /// Removes the tags with the given keys, all values included.
    async fn delete_tags(&self, guid: &str, keys: &[String]) -> Result<(), DirectoryError>;

    /// Adds tags. Values are appended to existing keys.
    async fn add_tags(&self, guid: &str, tags: &[Tag]) -> Result<(), DirectoryError>;

    /// Replaces the entity's entire tag set.
    async fn replace_tags(&self, guid: &str, tags: &[Tag]) -> Result<(), DirectoryError>;
}

/// Read access to previously emitted audit events.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Timestamp of the latest error-free event of `event_type` with the
    /// given `action` within the last `lookback_days` days.
    ///
    /// `Ok(None)` when there is no such event or the stored value is not a
    /// usable timestamp.
    async fn latest_timestamp(
        &self,
        event_type: &str,
        action: &str,
        lookback_days: u32,
    ) -> Result<Option<DateTime<Utc>>, DirectoryError>;
}
