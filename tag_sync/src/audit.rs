//! Audit events describing each sync cycle.
//!
//! Three actions are emitted per cycle, all carrying the cycle id:
//! `sync_start`, one `mapping_complete` per mapping (with its counters), and
//! `sync_end`. Events are best-effort: a sink failure is logged and never
//! fails the cycle.
//!
//! [`HttpAuditSink`] buffers events in memory and posts them as one JSON array
//! on [`AuditSink::flush`].

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shared_utils::env::configured_or_env;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{config::ConfigError, sync::MappingCounters};

const LICENSE_KEY_ENV: &str = "TAG_SYNC_LICENSE_KEY";

/// Event type used when the config does not name one.
pub const DEFAULT_EVENT_TYPE: &str = "EntityTagSync";

/// Default window searched for the last successful sync.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// `[events]` table.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Whether events are emitted (and the audit trail is available).
    pub enabled: bool,
    /// Account the events are stored in and queried from.
    pub account_id: i64,
    /// Event type name.
    pub event_type: String,
    /// Event ingest endpoint.
    pub ingest_url: String,
    /// Ingest key. Falls back to `TAG_SYNC_LICENSE_KEY`.
    pub license_key: Option<String>,
    /// How far back to look for the last successful sync.
    pub lookback_days: u32,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            account_id: 0,
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            ingest_url: String::new(),
            license_key: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl fmt::Debug for EventsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventsConfig")
            .field("enabled", &self.enabled)
            .field("account_id", &self.account_id)
            .field("event_type", &self.event_type)
            .field("ingest_url", &self.ingest_url)
            .field("license_key", &self.license_key.as_ref().map(|_| "[REDACTED]"))
            .field("lookback_days", &self.lookback_days)
            .finish()
    }
}

/// What an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A cycle began.
    SyncStart,
    /// One mapping finished, successfully or not.
    MappingComplete,
    /// The cycle finished.
    SyncEnd,
}

impl AuditAction {
    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::SyncStart => "sync_start",
            AuditAction::MappingComplete => "mapping_complete",
            AuditAction::SyncEnd => "sync_end",
        }
    }
}

/// One audit event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Event type name, from the config.
    pub event_type: String,
    /// Cycle id.
    pub id: String,
    /// What happened.
    pub action: AuditAction,
    /// True if the cycle or mapping failed.
    pub error: bool,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Position of the mapping in the config, for `mapping_complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_index: Option<usize>,
    /// Whether the mapping was skipped for lack of external records, for
    /// `mapping_complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_skipped: Option<bool>,
    /// Mapping counters, for `mapping_complete`.
    #[serde(flatten)]
    pub counters: Option<MappingCounters>,
}

impl AuditEvent {
    /// Creates an event without counters.
    pub fn new(event_type: &str, cycle_id: &str, action: AuditAction) -> Self {
        Self {
            event_type: event_type.to_string(),
            id: cycle_id.to_string(),
            action,
            error: false,
            error_message: None,
            mapping_index: None,
            mapping_skipped: None,
            counters: None,
        }
    }

    /// Marks the event failed with an optional message.
    pub fn with_error(mut self, failed: bool, message: Option<String>) -> Self {
        self.error = failed;
        self.error_message = message;
        self
    }
}

/// Errors delivering audit events.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The ingest request failed to send.
    #[error("event ingest request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The ingest endpoint rejected the batch.
    #[error("event ingest returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records one event.
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Delivers anything buffered.
    async fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Sink used when events are disabled.
#[derive(Debug, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn emit(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Buffers events and posts them to the ingest endpoint on flush.
pub struct HttpAuditSink {
    client: Client,
    ingest_url: String,
    license_key: SecretString,
    buffer: Mutex<Vec<AuditEvent>>,
}

impl HttpAuditSink {
    /// Creates a sink from the `[events]` table.
    pub fn new(config: &EventsConfig) -> Result<Self, ConfigError> {
        let ingest_url = config.ingest_url.trim();
        if ingest_url.is_empty() {
            return Err(ConfigError::Invalid(
                "events.ingest_url must be set when events are enabled".to_string(),
            ));
        }
        let license_key = configured_or_env(config.license_key.as_deref(), LICENSE_KEY_ENV)?;

        Ok(Self {
            client: Client::new(),
            ingest_url: ingest_url.to_string(),
            license_key: SecretString::new(license_key.into()),
            buffer: Mutex::new(Vec::new()),
        })
    }

    /// Number of events waiting for the next flush.
    pub async fn pending(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.buffer.lock().await.push(event);
        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditError> {
        let mut buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return Ok(());
        }

        debug!(events = buffer.len(), "flushing audit events");
        let response = self
            .client
            .post(&self.ingest_url)
            .header("X-Insert-Key", self.license_key.expose_secret())
            .json(&*buffer)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::Status {
                status: status.as_u16(),
                body,
            });
        }

        buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sync_events_serialize_without_counters() {
        let event = AuditEvent::new("EntityTagSync", "c-1", AuditAction::SyncEnd)
            .with_error(true, Some("1 mapping failed".into()));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "eventType": "EntityTagSync",
                "id": "c-1",
                "action": "sync_end",
                "error": true,
                "errorMessage": "1 mapping failed",
            })
        );
    }

    #[test]
    fn mapping_counters_are_flattened() {
        let mut event = AuditEvent::new("T", "c-1", AuditAction::MappingComplete);
        event.mapping_index = Some(0);
        event.mapping_skipped = Some(false);
        event.counters = Some(MappingCounters {
            external_records: 2,
            total: 5,
            scanned: 5,
            matched: 2,
            no_match: 3,
            updated: 1,
            skipped: 1,
            update_errors: 0,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["totalExternalEntities"], 2);
        assert_eq!(value["totalEntitiesScanned"], 5);
        assert_eq!(value["totalEntityUpdates"], 1);
        assert_eq!(value["mappingIndex"], 0);
        assert_eq!(value["mappingSkipped"], false);
        assert!(value.get("errorMessage").is_none());
    }

    #[test]
    fn http_sink_requires_ingest_url() {
        let config = EventsConfig {
            license_key: Some("k".into()),
            ..Default::default()
        };
        assert!(matches!(HttpAuditSink::new(&config), Err(ConfigError::Invalid(_))));
    }
}
