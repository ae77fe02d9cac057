//! Sync cycle orchestration.
//!
//! ## What a cycle does
//! - Emits `sync_start` under a fresh cycle id.
//! - Optionally looks up the last successful sync in the audit trail so
//!   providers can fetch only records changed since then.
//! - For each mapping, in config order: fetches external records once,
//!   pages through the matching entities, and for each entity runs the
//!   matcher, the tag diff and the directory mutations.
//! - Emits `mapping_complete` per mapping and `sync_end` at the end, then
//!   flushes the audit sink.
//!
//! ## Failure handling
//! A failed entity update is counted and the scan continues. A failed record
//! fetch or entity search ends that mapping and the cycle moves on to the
//! next one. The cycle fails if any mapping failed; it never aborts early.
//!
//! ## Dry-run
//! When [`SyncOptions::dry_run`] is set, diffs are computed and logged but
//! nothing is written. Entities that would change are counted as updated.

mod report;

use chrono::{DateTime, Utc};
use record_provider::{
    models::{record::ExternalRecord, request_params::RecordsRequest},
    providers::RecordProvider,
};
use shared_utils::paging::{Collected, Page, collect_pages};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::{
    audit::{AuditAction, AuditEvent, AuditSink, DEFAULT_EVENT_TYPE, DEFAULT_LOOKBACK_DAYS},
    config::MappingConfig,
    directory::{AuditTrail, EntityDirectory},
    error::{DirectoryError, FetchError, MutationError, TimestampResolutionError},
    matcher::find_match,
    models::EntityOutline,
    query::build_query,
    tags::{apply_diff, make_diff},
};

pub use report::{CycleOutcome, CycleReport, MappingCounters, MappingReport};

/// Options for one sync cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// If true, compute diffs and log them without writing.
    pub dry_run: bool,
    /// If true, pass the last successful sync time to the provider.
    pub use_last_update: bool,
}

/// What happened to one entity.
#[derive(Debug)]
enum EntityOutcome {
    NoMatch,
    Unchanged,
    Updated,
    Failed(Vec<MutationError>),
}

/// Runs sync cycles over a fixed set of mappings.
pub struct Syncer<'a> {
    provider: &'a (dyn RecordProvider + Send + Sync),
    directory: &'a dyn EntityDirectory,
    audit: &'a dyn AuditSink,
    trail: Option<&'a dyn AuditTrail>,
    mappings: &'a [MappingConfig],
    event_type: String,
    lookback_days: u32,
}

impl<'a> Syncer<'a> {
    /// Creates a syncer without an audit trail, so incremental sync is
    /// unavailable until [`Syncer::with_audit_trail`] is called.
    pub fn new(
        provider: &'a (dyn RecordProvider + Send + Sync),
        directory: &'a dyn EntityDirectory,
        audit: &'a dyn AuditSink,
        mappings: &'a [MappingConfig],
    ) -> Self {
        Self {
            provider,
            directory,
            audit,
            trail: None,
            mappings,
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    /// Sets the event type used for emitted events and trail lookups.
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Enables last-sync lookups within `lookback_days`.
    pub fn with_audit_trail(mut self, trail: &'a dyn AuditTrail, lookback_days: u32) -> Self {
        self.trail = Some(trail);
        self.lookback_days = lookback_days;
        self
    }

    /// Runs one cycle over every mapping.
    pub async fn run_cycle(&self, options: &SyncOptions) -> CycleReport {
        let cycle_id = Uuid::new_v4().to_string();
        info!(cycle_id = %cycle_id, mappings = self.mappings.len(), dry_run = options.dry_run, "sync cycle started");
        self.emit(AuditEvent::new(&self.event_type, &cycle_id, AuditAction::SyncStart))
            .await;

        let last_sync = if options.use_last_update {
            match self.resolve_last_sync().await {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(error = %e, "falling back to a full sync");
                    None
                }
            }
        } else {
            None
        };

        let mut reports = Vec::with_capacity(self.mappings.len());
        let mut error_count = 0;

        for (index, mapping) in self.mappings.iter().enumerate() {
            let report = self.sync_mapping(index, mapping, last_sync, options).await;
            if report.failed() {
                error_count += 1;
            }

            let mut event = AuditEvent::new(&self.event_type, &cycle_id, AuditAction::MappingComplete)
                .with_error(report.failed(), report.error.clone());
            event.mapping_index = Some(index);
            event.mapping_skipped = Some(report.skipped);
            event.counters = Some(report.counters);
            self.emit(event).await;

            reports.push(report);
        }

        let outcome = if error_count > 0 {
            CycleOutcome::Failed
        } else {
            CycleOutcome::Complete
        };

        let message = (error_count > 0).then(|| format!("{error_count} mapping(s) failed"));
        self.emit(
            AuditEvent::new(&self.event_type, &cycle_id, AuditAction::SyncEnd)
                .with_error(error_count > 0, message),
        )
        .await;
        if let Err(e) = self.audit.flush().await {
            warn!(error = %e, "failed to flush audit events");
        }

        info!(cycle_id = %cycle_id, error_count, outcome = ?outcome, "sync cycle finished");

        CycleReport {
            cycle_id,
            outcome,
            mappings: reports,
            error_count,
            last_sync,
        }
    }

    /// Looks up the latest error-free `sync_end` in the audit trail.
    pub async fn resolve_last_sync(
        &self,
    ) -> Result<Option<DateTime<Utc>>, TimestampResolutionError> {
        let trail = self.trail.ok_or(TimestampResolutionError::EventsDisabled)?;
        trace!(event_type = %self.event_type, "querying for latest sync timestamp");
        let ts = trail
            .latest_timestamp(
                &self.event_type,
                AuditAction::SyncEnd.as_str(),
                self.lookback_days,
            )
            .await
            .map_err(TimestampResolutionError::Query)?;
        debug!(last_sync = ?ts, "resolved last sync");
        Ok(ts)
    }

    async fn emit(&self, event: AuditEvent) {
        let action = event.action;
        if let Err(e) = self.audit.emit(event).await {
            warn!(action = action.as_str(), error = %e, "failed to push audit event");
        }
    }

    async fn sync_mapping(
        &self,
        index: usize,
        mapping: &MappingConfig,
        last_sync: Option<DateTime<Utc>>,
        options: &SyncOptions,
    ) -> MappingReport {
        let query = build_query(&mapping.entity_query);
        let mut report = MappingReport::new(index, query);

        debug!(mapping = index, record_type = %mapping.external_query.record_type, "reading external records");
        let request = RecordsRequest {
            query: mapping.external_query.clone(),
            fields: mapping.record_fields(),
            last_sync,
        };
        let records = match self.provider.fetch_records(&request).await {
            Ok(records) => records,
            Err(e) => {
                let e = FetchError::Records(e);
                error!(mapping = index, provider = self.provider.name(), error = %e, "mapping failed");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.counters.external_records = records.len();
        debug!(mapping = index, records = records.len(), "read external records");

        if records.is_empty() {
            debug!(mapping = index, "no external records, skipping entity scan");
            report.skipped = true;
            return report;
        }

        debug!(mapping = index, query = %report.query, "fetching entities");
        let entities = match self.fetch_entities(&report.query).await {
            Ok(entities) => entities,
            Err(e) => {
                let e = FetchError::Entities(e);
                error!(mapping = index, error = %e, "mapping failed");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.counters.total = entities.total.unwrap_or(entities.items.len() as u64);

        for entity in &entities.items {
            report.counters.scanned += 1;
            let outcome = self.process_entity(mapping, entity, &records, options).await;
            trace!(guid = %entity.guid, name = %entity.name, outcome = ?outcome, "processed entity");

            let c = &mut report.counters;
            match outcome {
                EntityOutcome::NoMatch => c.no_match += 1,
                EntityOutcome::Unchanged => {
                    c.matched += 1;
                    c.skipped += 1;
                }
                EntityOutcome::Updated => {
                    c.matched += 1;
                    c.updated += 1;
                }
                EntityOutcome::Failed(errors) => {
                    c.matched += 1;
                    c.update_errors += 1;
                    for e in errors {
                        warn!(guid = %entity.guid, error = %e, "entity update failed");
                    }
                }
            }
        }

        debug!(mapping = index, counters = ?report.counters, "mapping complete");
        report
    }

    async fn fetch_entities(
        &self,
        query: &str,
    ) -> Result<Collected<EntityOutline>, DirectoryError> {
        let directory = self.directory;
        collect_pages(move |cursor: Option<String>| async move {
            directory
                .search(query, cursor.as_deref())
                .await
                .map(|page| Page::new(page.entities, page.next_cursor).with_total(page.count))
        })
        .await
    }

    async fn process_entity(
        &self,
        mapping: &MappingConfig,
        entity: &EntityOutline,
        records: &[ExternalRecord],
        options: &SyncOptions,
    ) -> EntityOutcome {
        let Some(record) = find_match(entity, &mapping.match_rule, records) else {
            return EntityOutcome::NoMatch;
        };
        debug!(record = %record.id, guid = %entity.guid, name = %entity.name, "external record matches entity");

        let diff = make_diff(&mapping.mapping, record, entity);
        if diff.is_noop() {
            return EntityOutcome::Unchanged;
        }

        if options.dry_run {
            info!(guid = %entity.guid, name = %entity.name, "dry run, would apply:\n{diff}");
            return EntityOutcome::Updated;
        }

        let errors = apply_diff(self.directory, entity, &diff).await;
        if errors.is_empty() {
            EntityOutcome::Updated
        } else {
            EntityOutcome::Failed(errors)
        }
    }
}
