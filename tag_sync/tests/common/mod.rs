#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use record_provider::{
    models::{
        record::ExternalRecord,
        request_params::{RecordQuery, RecordsRequest},
    },
    providers::{ApiSnafu, ProviderError, RecordProvider},
};
use tag_sync::{
    audit::{AuditError, AuditEvent, AuditSink},
    config::MappingConfig,
    directory::{AuditTrail, EntityDirectory},
    error::DirectoryError,
    matcher::{MatchOperator, MatchRule},
    models::{EntityOutline, EntitySearchPage, Tag},
    query::EntityQuery,
};

/// Provider returning canned records per record type.
#[derive(Default)]
pub struct FakeProvider {
    records: HashMap<String, Vec<ExternalRecord>>,
    failing: HashSet<String>,
    pub requests: Mutex<Vec<RecordsRequest>>,
}

impl FakeProvider {
    pub fn with_records(mut self, record_type: &str, records: Vec<ExternalRecord>) -> Self {
        self.records.insert(record_type.to_string(), records);
        self
    }

    pub fn failing_for(mut self, record_type: &str) -> Self {
        self.failing.insert(record_type.to_string());
        self
    }

    pub fn requests(&self) -> Vec<RecordsRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_records(
        &self,
        request: &RecordsRequest,
    ) -> Result<Vec<ExternalRecord>, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let record_type = &request.query.record_type;
        if self.failing.contains(record_type) {
            return ApiSnafu {
                status: 500u16,
                message: "boom",
            }
            .fail();
        }
        Ok(self.records.get(record_type).cloned().unwrap_or_default())
    }
}

/// A call made against [`FakeDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search { query: String, cursor: Option<String> },
    Delete { guid: String, keys: Vec<String> },
    Add { guid: String, tags: Vec<Tag> },
    Replace { guid: String, tags: Vec<Tag> },
}

/// In-memory directory serving `entities` in pages of `page_size`.
pub struct FakeDirectory {
    entities: Vec<EntityOutline>,
    page_size: usize,
    fail_search: bool,
    fail_mutations_for: HashSet<String>,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeDirectory {
    pub fn new(entities: Vec<EntityOutline>) -> Self {
        Self {
            entities,
            page_size: 100,
            fail_search: false,
            fail_mutations_for: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn failing_mutations_for(mut self, guid: &str) -> Self {
        self.fail_mutations_for.insert(guid.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Search { .. }))
            .collect()
    }

    pub fn searches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Search { .. }))
            .count()
    }

    fn mutation_result(&self, guid: &str) -> Result<(), DirectoryError> {
        if self.fail_mutations_for.contains(guid) {
            Err(DirectoryError::Tagging {
                messages: vec!["tag limit exceeded".to_string()],
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EntityDirectory for FakeDirectory {
    async fn search(
        &self,
        query: &str,
        cursor: Option<&str>,
    ) -> Result<EntitySearchPage, DirectoryError> {
        self.calls.lock().unwrap().push(Call::Search {
            query: query.to_string(),
            cursor: cursor.map(str::to_string),
        });
        if self.fail_search {
            return Err(DirectoryError::GraphQl {
                messages: vec!["search unavailable".to_string()],
            });
        }

        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(self.entities.len());
        Ok(EntitySearchPage {
            count: self.entities.len() as u64,
            entities: self.entities[start..end].to_vec(),
            next_cursor: (end < self.entities.len()).then(|| end.to_string()),
        })
    }

    async fn delete_tags(&self, guid: &str, keys: &[String]) -> Result<(), DirectoryError> {
        self.calls.lock().unwrap().push(Call::Delete {
            guid: guid.to_string(),
            keys: keys.to_vec(),
        });
        self.mutation_result(guid)
    }

    async fn add_tags(&self, guid: &str, tags: &[Tag]) -> Result<(), DirectoryError> {
        self.calls.lock().unwrap().push(Call::Add {
            guid: guid.to_string(),
            tags: tags.to_vec(),
        });
        self.mutation_result(guid)
    }

    async fn replace_tags(&self, guid: &str, tags: &[Tag]) -> Result<(), DirectoryError> {
        self.calls.lock().unwrap().push(Call::Replace {
            guid: guid.to_string(),
            tags: tags.to_vec(),
        });
        self.mutation_result(guid)
    }
}

/// Sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<AuditEvent>>,
    pub flushes: Mutex<usize>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn flush(&self) -> Result<(), AuditError> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Trail returning a fixed answer.
pub struct FixedTrail(pub Option<DateTime<Utc>>);

#[async_trait]
impl AuditTrail for FixedTrail {
    async fn latest_timestamp(
        &self,
        _event_type: &str,
        _action: &str,
        _lookback_days: u32,
    ) -> Result<Option<DateTime<Utc>>, DirectoryError> {
        Ok(self.0)
    }
}

/// Trail whose query always fails.
pub struct BrokenTrail;

#[async_trait]
impl AuditTrail for BrokenTrail {
    async fn latest_timestamp(
        &self,
        _event_type: &str,
        _action: &str,
        _lookback_days: u32,
    ) -> Result<Option<DateTime<Utc>>, DirectoryError> {
        Err(DirectoryError::Malformed("no account".to_string()))
    }
}

pub fn entity(guid: &str, tags: Vec<Tag>) -> EntityOutline {
    EntityOutline {
        guid: guid.to_string(),
        name: format!("entity-{guid}"),
        account_id: 1,
        domain: "INFRA".to_string(),
        entity_type: "HOST".to_string(),
        tags,
    }
}

pub fn mapping(
    record_type: &str,
    rule: (&str, MatchOperator, &str),
    fields: &[(&str, &str)],
) -> MappingConfig {
    MappingConfig {
        external_query: RecordQuery {
            record_type: record_type.to_string(),
            ..Default::default()
        },
        entity_query: EntityQuery {
            types: ["HOST".to_string()].into_iter().collect(),
            ..Default::default()
        },
        match_rule: MatchRule {
            external_key: rule.0.to_string(),
            operator: rule.1,
            internal_key: rule.2.to_string(),
        },
        mapping: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}
