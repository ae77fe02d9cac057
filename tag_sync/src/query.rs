//! Directory search query builder.
//!
//! A mapping selects internal entities either with a raw query string or
//! with a structured [`EntityQuery`] that [`build_query`] renders into the
//! directory's query language:
//!
//! ```text
//! domain IN ('APM') AND type IN ('APPLICATION') AND name LIKE 'web-%'
//!   AND tags.`accountId` = 12345 AND tags.`env` IN ('prod','stage')
//! ```
//!
//! Values are quoted with `'` but never escaped. Embedded quotes end up in
//! the query as-is, so configuration must not contain them.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A tag filter clause: the tag `key` must hold one of `values`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    /// Tag key.
    pub key: String,
    /// Accepted values.
    #[serde(default)]
    pub values: IndexSet<String>,
}

/// Structured filter selecting internal entities.
///
/// Empty fields do not constrain the search. A non-empty
/// [`raw_query`](EntityQuery::raw_query) replaces everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityQuery {
    /// Entity types, e.g. `["HOST", "APPLICATION"]`.
    #[serde(rename = "type")]
    pub types: IndexSet<String>,
    /// Entity domains, e.g. `["APM", "INFRA"]`.
    #[serde(rename = "domain")]
    pub domains: IndexSet<String>,
    /// `LIKE` pattern on the entity name.
    pub name: String,
    /// Owning account. Zero means any.
    pub account_id: i64,
    /// Tag filters, all of which must hold.
    pub tags: Vec<TagFilter>,
    /// Verbatim query string.
    #[serde(rename = "query")]
    pub raw_query: String,
}

impl EntityQuery {
    /// Builds a query that is passed through verbatim.
    pub fn raw(query: impl Into<String>) -> Self {
        Self {
            raw_query: query.into(),
            ..Default::default()
        }
    }
}

fn in_list<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    let joined = values
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("','");
    format!("('{joined}')")
}

/// Renders `query` into the directory's query language.
///
/// Clauses appear in a fixed order (domain, type, name, account, tags) and are
/// joined with ` AND `. An empty query renders as the empty string, which the
/// directory treats as "all entities".
pub fn build_query(query: &EntityQuery) -> String {
    if !query.raw_query.is_empty() {
        return query.raw_query.clone();
    }

    let mut parts = Vec::new();

    if !query.domains.is_empty() {
        parts.push(format!("domain IN {}", in_list(&query.domains)));
    }
    if !query.types.is_empty() {
        parts.push(format!("type IN {}", in_list(&query.types)));
    }
    if !query.name.is_empty() {
        parts.push(format!("name LIKE '{}'", query.name));
    }
    if query.account_id != 0 {
        parts.push(format!("tags.`accountId` = {}", query.account_id));
    }
    for tag in &query.tags {
        parts.push(format!("tags.`{}` IN {}", tag.key, in_list(&tag.values)));
    }

    parts.join(" AND ")
}
