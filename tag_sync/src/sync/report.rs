use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-mapping tallies. Serialized into `mapping_complete` events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingCounters {
    /// Records read from the system of record.
    #[serde(rename = "totalExternalEntities")]
    pub external_records: usize,
    /// Entity total reported by the directory.
    #[serde(rename = "totalEntities")]
    pub total: u64,
    /// Entities examined.
    #[serde(rename = "totalEntitiesScanned")]
    pub scanned: usize,
    /// Entities with a matching record.
    #[serde(rename = "totalEntitiesMatched")]
    pub matched: usize,
    /// Entities without a matching record.
    #[serde(rename = "totalEntitiesNoMatch")]
    pub no_match: usize,
    /// Matched entities whose tags were changed.
    #[serde(rename = "totalEntityUpdates")]
    pub updated: usize,
    /// Matched entities already up to date.
    #[serde(rename = "totalEntitiesSkipped")]
    pub skipped: usize,
    /// Matched entities where at least one tag mutation failed.
    #[serde(rename = "totalEntityUpdateErrors")]
    pub update_errors: usize,
}

/// Outcome of one mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingReport {
    /// Position in the config.
    pub index: usize,
    /// Rendered directory query.
    pub query: String,
    /// Tallies.
    pub counters: MappingCounters,
    /// Fetch or scan failure, if any.
    pub error: Option<String>,
    /// True if no external records were found and the entity scan was
    /// skipped.
    pub skipped: bool,
}

impl MappingReport {
    pub(crate) fn new(index: usize, query: String) -> Self {
        Self {
            index,
            query,
            counters: MappingCounters::default(),
            error: None,
            skipped: false,
        }
    }

    /// True if the mapping counts against the cycle.
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.counters.update_errors > 0
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every mapping succeeded.
    Complete,
    /// At least one mapping failed.
    Failed,
}

/// Summary of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Generated cycle id, shared by all of the cycle's audit events.
    pub cycle_id: String,
    /// Overall outcome.
    pub outcome: CycleOutcome,
    /// One report per mapping, in config order.
    pub mappings: Vec<MappingReport>,
    /// Number of failed mappings.
    pub error_count: usize,
    /// Last successful sync used for incremental fetches.
    pub last_sync: Option<DateTime<Utc>>,
}

impl CycleReport {
    /// True if the cycle failed.
    pub fn is_failed(&self) -> bool {
        self.outcome == CycleOutcome::Failed
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match self.outcome {
            CycleOutcome::Complete => "complete",
            CycleOutcome::Failed => "FAILED",
        };
        writeln!(
            f,
            "cycle {} {outcome} ({} of {} mappings failed)",
            self.cycle_id,
            self.error_count,
            self.mappings.len()
        )?;
        if let Some(ts) = self.last_sync {
            writeln!(f, "incremental since {}", ts.to_rfc3339())?;
        }
        for m in &self.mappings {
            let c = &m.counters;
            write!(
                f,
                "[{}] records={} entities={} scanned={} matched={} no_match={} updated={} skipped={} errors={}",
                m.index,
                c.external_records,
                c.total,
                c.scanned,
                c.matched,
                c.no_match,
                c.updated,
                c.skipped,
                c.update_errors
            )?;
            if m.skipped {
                write!(f, " skipped (no external records)")?;
            }
            if let Some(err) = &m.error {
                write!(f, " error: {err}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
