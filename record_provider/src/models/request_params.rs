use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::servicenow::ServiceNowParams;

/// Which records to read from the system of record, as written in a mapping's
/// `external_query` table.
///
/// This is vendor-agnostic; anything only one provider understands lives in
/// [`ProviderParams`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Record type to read, e.g. a ServiceNow table such as `cmdb_ci_server`.
    #[serde(rename = "type")]
    pub record_type: String,

    /// Optional raw filter expression in the provider's own query language.
    ///
    /// Providers may expand placeholders in it (see the ServiceNow provider's
    /// `${lastUpdateDate}` / `${lastUpdateTime}`).
    #[serde(default, alias = "query")]
    pub filter: Option<String>,

    /// Optional, provider-specific parameters.
    #[serde(default)]
    pub provider_specific: ProviderParams,
}

/// Universal parameters for one "fetch all records" call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordsRequest {
    /// Record type, filter and provider extras.
    pub query: RecordQuery,

    /// Attribute paths the caller needs. Providers always add their own
    /// unique-id field.
    pub fields: Vec<String>,

    /// Time of the last successful sync, for incremental filters.
    pub last_sync: Option<DateTime<Utc>>,
}

/// An enum to hold provider-specific request parameters.
///
/// This allows callers to specify detailed, per-mapping options for a
/// particular provider without cluttering the universal [`RecordQuery`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderParams {
    #[default]
    None,
    #[serde(rename = "servicenow")]
    ServiceNow(ServiceNowParams),
}
