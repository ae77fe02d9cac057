//! GraphQL client for the entity directory, and the NRQL-backed audit trail.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    Client,
    header::{self, HeaderMap, HeaderValue},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use shared_utils::env::configured_or_env;
use tracing::{debug, trace, warn};

use crate::{
    config::ConfigError,
    directory::{AuditTrail, EntityDirectory},
    error::DirectoryError,
    models::{EntityOutline, EntitySearchPage, Tag},
};

const API_KEY_ENV: &str = "TAG_SYNC_API_KEY";

const ENTITY_SEARCH: &str = r#"query($query: String, $cursor: String) {
  actor {
    entitySearch(query: $query) {
      count
      results(cursor: $cursor) {
        entities { guid name accountId domain type tags { key values } }
        nextCursor
      }
    }
  }
}"#;

const ADD_TAGS: &str = r#"mutation($guid: EntityGuid!, $tags: [TaggingTagInput!]!) {
  taggingAddTagsToEntity(guid: $guid, tags: $tags) { errors { message type } }
}"#;

const DELETE_TAGS: &str = r#"mutation($guid: EntityGuid!, $tagKeys: [String!]!) {
  taggingDeleteTagFromEntity(guid: $guid, tagKeys: $tagKeys) { errors { message type } }
}"#;

const REPLACE_TAGS: &str = r#"mutation($guid: EntityGuid!, $tags: [TaggingTagInput!]!) {
  taggingReplaceTagsOnEntity(guid: $guid, tags: $tags) { errors { message type } }
}"#;

const NRQL: &str = r#"query($accountId: Int!, $nrql: Nrql!) {
  actor { account(id: $accountId) { nrql(query: $nrql) { results } } }
}"#;

/// Connection settings for the directory API (`[directory]` table).
#[derive(Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL; requests go to `{api_url}/graphql`.
    pub api_url: String,
    /// User API key. Falls back to `TAG_SYNC_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    actor: SearchActor,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchActor {
    entity_search: EntitySearch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntitySearch {
    #[serde(default)]
    count: u64,
    results: SearchResults,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResults {
    #[serde(default)]
    entities: Vec<EntityOutline>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct MutationResult {
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct NrqlData {
    actor: NrqlActor,
}

#[derive(Deserialize)]
struct NrqlActor {
    account: NrqlAccount,
}

#[derive(Deserialize)]
struct NrqlAccount {
    nrql: NrqlResult,
}

#[derive(Deserialize)]
struct NrqlResult {
    #[serde(default)]
    results: Vec<serde_json::Map<String, Value>>,
}

/// GraphQL client for the entity directory.
pub struct GraphQlDirectory {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl GraphQlDirectory {
    /// Creates a client. The API key comes from the config or the environment.
    pub fn new(config: &DirectoryConfig) -> Result<Self, ConfigError> {
        let api_url = config.api_url.trim().trim_end_matches('/');
        if api_url.is_empty() {
            return Err(ConfigError::Invalid(
                "directory.api_url must not be empty".to_string(),
            ));
        }
        let api_key = configured_or_env(config.api_key.as_deref(), API_KEY_ENV)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{api_url}/graphql"),
            api_key: SecretString::new(api_key.into()),
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, DirectoryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("API-Key", self.api_key.expose_secret())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let decoded: GraphQlResponse<T> = serde_json::from_slice(&body)?;

        let errors = decoded.errors.unwrap_or_default();
        if !errors.is_empty() {
            return Err(DirectoryError::GraphQl {
                messages: errors.into_iter().map(|e| e.message).collect(),
            });
        }

        decoded
            .data
            .ok_or_else(|| DirectoryError::Malformed("response has no data".to_string()))
    }

    async fn mutate(
        &self,
        mutation: &str,
        field: &str,
        variables: Value,
    ) -> Result<(), DirectoryError> {
        let mut data: serde_json::Map<String, Value> = self.execute(mutation, variables).await?;
        let result = data
            .remove(field)
            .ok_or_else(|| DirectoryError::Malformed(format!("missing `{field}` in response")))?;
        let result: MutationResult = serde_json::from_value(result)?;

        match result.errors {
            Some(errors) if !errors.is_empty() => Err(DirectoryError::Tagging {
                messages: errors.into_iter().map(|e| e.message).collect(),
            }),
            _ => Ok(()),
        }
    }

    /// Runs an NRQL query against `account_id` and returns the result rows.
    pub async fn nrql(
        &self,
        account_id: i64,
        nrql: &str,
    ) -> Result<Vec<serde_json::Map<String, Value>>, DirectoryError> {
        debug!(account_id, nrql, "running nrql query");
        let data: NrqlData = self
            .execute(NRQL, json!({ "accountId": account_id, "nrql": nrql }))
            .await?;
        Ok(data.actor.account.nrql.results)
    }
}

#[async_trait]
impl EntityDirectory for GraphQlDirectory {
    async fn search(
        &self,
        query: &str,
        cursor: Option<&str>,
    ) -> Result<EntitySearchPage, DirectoryError> {
        trace!(query, cursor, "searching entities");
        let data: SearchData = self
            .execute(ENTITY_SEARCH, json!({ "query": query, "cursor": cursor }))
            .await?;

        let search = data.actor.entity_search;
        Ok(EntitySearchPage {
            count: search.count,
            entities: search.results.entities,
            next_cursor: search.results.next_cursor.filter(|c| !c.is_empty()),
        })
    }

    async fn delete_tags(&self, guid: &str, keys: &[String]) -> Result<(), DirectoryError> {
        self.mutate(
            DELETE_TAGS,
            "taggingDeleteTagFromEntity",
            json!({ "guid": guid, "tagKeys": keys }),
        )
        .await
    }

    async fn add_tags(&self, guid: &str, tags: &[Tag]) -> Result<(), DirectoryError> {
        self.mutate(
            ADD_TAGS,
            "taggingAddTagsToEntity",
            json!({ "guid": guid, "tags": tags }),
        )
        .await
    }

    async fn replace_tags(&self, guid: &str, tags: &[Tag]) -> Result<(), DirectoryError> {
        self.mutate(
            REPLACE_TAGS,
            "taggingReplaceTagsOnEntity",
            json!({ "guid": guid, "tags": tags }),
        )
        .await
    }
}

/// [`AuditTrail`] over the NRQL query surface of one account.
pub struct EventHistory<'a> {
    directory: &'a GraphQlDirectory,
    account_id: i64,
}

impl<'a> EventHistory<'a> {
    /// Queries events stored in `account_id`.
    pub fn new(directory: &'a GraphQlDirectory, account_id: i64) -> Self {
        Self {
            directory,
            account_id,
        }
    }
}

/// Builds the query for the latest error-free `action` event.
pub fn latest_timestamp_nrql(event_type: &str, action: &str, lookback_days: u32) -> String {
    format!(
        "SELECT latest(timestamp) FROM {event_type} WHERE action = '{action}' \
         AND error IS FALSE SINCE {lookback_days} DAYS AGO"
    )
}

/// Reads `latest.timestamp` (epoch milliseconds) from the first result row.
pub fn parse_latest_timestamp(rows: &[serde_json::Map<String, Value>]) -> Option<DateTime<Utc>> {
    let Some(row) = rows.first() else {
        warn!("no results found searching for last update timestamp");
        return None;
    };
    let Some(value) = row.get("latest.timestamp") else {
        warn!("no timestamp attribute found in result");
        return None;
    };
    let Some(millis) = value.as_f64() else {
        warn!(value = %value, "timestamp attribute is not a number");
        return None;
    };
    let parsed = DateTime::from_timestamp_millis(millis as i64);
    if parsed.is_none() {
        warn!(millis, "timestamp attribute is out of range");
    }
    parsed
}

#[async_trait]
impl AuditTrail for EventHistory<'_> {
    async fn latest_timestamp(
        &self,
        event_type: &str,
        action: &str,
        lookback_days: u32,
    ) -> Result<Option<DateTime<Utc>>, DirectoryError> {
        let rows = self
            .directory
            .nrql(
                self.account_id,
                &latest_timestamp_nrql(event_type, action, lookback_days),
            )
            .await?;
        Ok(parse_latest_timestamp(&rows))
    }
}
