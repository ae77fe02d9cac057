//! Configuration: parsing, normalization, and loading.
//!
//! The whole program is driven by one TOML file:
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [directory]
//! api_url = "https://api.example.com"
//!
//! [events]
//! account_id = 12345
//! ingest_url = "https://events.example.com/v1/accounts/12345/events"
//!
//! [provider]
//! kind = "servicenow"
//! api_url = "https://acme.service-now.com"
//!
//! [[mappings]]
//! external_query = { type = "cmdb_ci_server" }
//! entity_query = { type = ["HOST"] }
//! match = { external_key = "name", operator = "equal-ignore-case", internal_key = "name" }
//! mapping = { "location.value" = "location" }
//! ```
//!
//! Secrets may be left out of the file and supplied through the environment
//! (see [`crate::directory::DirectoryConfig`], [`crate::audit::EventsConfig`]
//! and the provider config).
//!
//! Key behaviors:
//! - Normalization trims match keys, record types and mapping keys/values.
//! - Validation rejects configs with no mappings, mappings with an empty
//!   field mapping, and empty keys or record types after trimming.
//!
//! Entrypoints: [`load_config_str`] and [`load_config_path`].

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use record_provider::models::request_params::RecordQuery;
use serde::Deserialize;
use shared_utils::env::MissingEnvVarError;
use thiserror::Error;
use toml::from_str;

use crate::{
    audit::EventsConfig,
    directory::DirectoryConfig,
    logging::LogConfig,
    matcher::MatchRule,
    providers::ProviderConfig,
    query::EntityQuery,
    sync::SyncOptions,
    tags::FieldMapping,
};

/// Errors that stop the program before a cycle starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("read config file {}: {source}", .path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The TOML is malformed or does not match the expected shape.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// A secret is neither in the file nor in the environment.
    #[error(transparent)]
    MissingSecret(#[from] MissingEnvVarError),
}

/// One mapping: which records, which entities, how to match, what to copy.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    /// Records to read from the system of record.
    pub external_query: RecordQuery,
    /// Entities to update.
    #[serde(default)]
    pub entity_query: EntityQuery,
    /// How a record is paired with an entity.
    #[serde(rename = "match")]
    pub match_rule: MatchRule,
    /// External attribute path -> tag key.
    pub mapping: FieldMapping,
}

impl MappingConfig {
    /// Attribute paths the provider must return: the match key followed by
    /// every mapped path, without duplicates.
    pub fn record_fields(&self) -> Vec<String> {
        let mut fields = IndexSet::new();
        fields.insert(self.match_rule.external_key.clone());
        fields.extend(self.mapping.keys().cloned());
        fields.into_iter().collect()
    }
}

/// `[sync]` table: defaults for CLI flags.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct SyncDefaults {
    /// Default for `--dry-run`.
    pub dry_run: bool,
    /// Default for `--use-last-update`.
    pub use_last_update: bool,
}

impl SyncDefaults {
    /// Combines file defaults with CLI flags; a set flag always wins.
    pub fn options(&self, dry_run: bool, use_last_update: bool) -> SyncOptions {
        SyncOptions {
            dry_run: self.dry_run || dry_run,
            use_last_update: self.use_last_update || use_last_update,
        }
    }
}

/// The whole config file.
#[derive(Debug, Deserialize)]
pub struct SyncConfig {
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
    /// Entity directory connection.
    pub directory: DirectoryConfig,
    /// Audit events.
    #[serde(default)]
    pub events: EventsConfig,
    /// Flag defaults.
    #[serde(default)]
    pub sync: SyncDefaults,
    /// System of record.
    pub provider: ProviderConfig,
    /// Mappings, processed in order.
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default)]
pub struct NormalizationReport {
    /// Number of keys, record types or values that changed when trimmed.
    pub values_trimmed: usize,
}

fn trim_in_place(value: &mut String, report: &mut NormalizationReport) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
        report.values_trimmed += 1;
    }
}

fn require(value: &str, what: &str, index: usize) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "mappings[{index}]: {what} cannot be empty"
        )));
    }
    Ok(())
}

/// Normalizes and validates a parsed config in place.
///
/// Errors:
/// - No mappings
/// - Empty record type, match key or field mapping in any mapping
/// - Mapping keys that collide after trimming
/// - Events enabled without an account id
pub fn normalize_config(config: &mut SyncConfig) -> Result<NormalizationReport, ConfigError> {
    let mut report = NormalizationReport::default();

    if config.mappings.is_empty() {
        return Err(ConfigError::Invalid(
            "at least one [[mappings]] entry is required".to_string(),
        ));
    }

    for (index, m) in config.mappings.iter_mut().enumerate() {
        trim_in_place(&mut m.external_query.record_type, &mut report);
        require(&m.external_query.record_type, "external_query.type", index)?;

        trim_in_place(&mut m.match_rule.external_key, &mut report);
        require(&m.match_rule.external_key, "match.external_key", index)?;
        trim_in_place(&mut m.match_rule.internal_key, &mut report);
        require(&m.match_rule.internal_key, "match.internal_key", index)?;

        if m.mapping.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "mappings[{index}]: mapping cannot be empty"
            )));
        }

        let mut rebuilt = IndexMap::with_capacity(m.mapping.len());
        for (mut external, mut tag) in std::mem::take(&mut m.mapping) {
            trim_in_place(&mut external, &mut report);
            trim_in_place(&mut tag, &mut report);
            require(&external, "mapping key", index)?;
            require(&tag, "mapping tag", index)?;
            if rebuilt.contains_key(&external) {
                return Err(ConfigError::Invalid(format!(
                    "mappings[{index}]: duplicate mapping key after trimming: {external}"
                )));
            }
            rebuilt.insert(external, tag);
        }
        m.mapping = rebuilt;
    }

    if config.events.enabled && config.events.account_id == 0 {
        return Err(ConfigError::Invalid(
            "events.account_id is required when events are enabled".to_string(),
        ));
    }

    Ok(report)
}

/// Parse and normalize a config from a TOML string.
pub fn load_config_str(toml_str: &str) -> Result<SyncConfig, ConfigError> {
    let mut config: SyncConfig = from_str(toml_str)?;
    let report = normalize_config(&mut config)?;
    tracing::debug!(?report, "normalized config");
    Ok(config)
}

/// Read a config TOML file from disk, parse, and normalize it.
///
/// See [`load_config_str`] for details on parsing and normalization.
pub fn load_config_path(path: impl AsRef<Path>) -> Result<SyncConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_str(&text)
}
