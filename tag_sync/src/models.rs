//! Entity directory data types.
//!
//! These mirror the shape the directory's entity search returns (camelCase
//! JSON) and are shared by the matcher, the tag diff and the orchestrator:
//! - [`EntityOutline`]: one internal entity and its tags
//! - [`Tag`]: a key with one or more values
//! - [`EntitySearchPage`]: one page of a cursor-paginated search

use serde::{Deserialize, Serialize};

/// A tag on an internal entity.
///
/// A key may carry several values. Where a single value is needed, the first
/// one is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key (e.g. "environment").
    pub key: String,
    /// Tag values, in the order the directory returned them.
    pub values: Vec<String>,
}

impl Tag {
    /// Builds a tag with a single value.
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: vec![value.into()],
        }
    }

    /// First value, if any.
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// The subset of an internal entity needed for matching and tagging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityOutline {
    /// Globally unique entity id. Tag mutations are addressed by it.
    pub guid: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Owning account.
    #[serde(default)]
    pub account_id: i64,
    /// Entity domain (e.g. "APM", "INFRA").
    #[serde(default)]
    pub domain: String,
    /// Entity type within the domain (e.g. "HOST").
    #[serde(default, rename = "type")]
    pub entity_type: String,
    /// Tags in directory order.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl EntityOutline {
    /// Values of the tag whose key equals `key` exactly.
    pub fn tag_values(&self, key: &str) -> Option<&[String]> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.values.as_slice())
    }
}

/// One page of an entity search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySearchPage {
    /// Total number of entities the directory reports for the whole query.
    pub count: u64,
    /// Entities on this page.
    pub entities: Vec<EntityOutline>,
    /// Cursor for the next page. `None` on the last page.
    pub next_cursor: Option<String>,
}
