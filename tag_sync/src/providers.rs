//! Provider registry that maps the configured provider to a concrete
//! [`RecordProvider`].
use record_provider::providers::{
    ProviderInitError, RecordProvider,
    servicenow::{ServiceNowConfig, ServiceNowProvider},
};
use serde::{Deserialize, Serialize};

/// Which system of record to read (serde snake_case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// ServiceNow table API.
    #[serde(rename = "servicenow")]
    ServiceNow,
}

/// `[provider]` table, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind")]
pub enum ProviderConfig {
    /// ServiceNow connection settings.
    #[serde(rename = "servicenow")]
    ServiceNow(ServiceNowConfig),
}

impl ProviderConfig {
    /// The provider this config selects.
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderConfig::ServiceNow(_) => ProviderKind::ServiceNow,
        }
    }
}

/// Build and return a boxed record provider for the supplied config.
pub fn build_provider(
    config: &ProviderConfig,
) -> Result<Box<dyn RecordProvider + Send + Sync>, ProviderInitError> {
    match config {
        ProviderConfig::ServiceNow(cfg) => {
            let p = ServiceNowProvider::new(cfg.clone())?;
            Ok(Box::new(p))
        }
    }
}
