//! Provider abstraction for systems of record.
//!
//! This module defines the [`RecordProvider`] trait, which serves as a unified
//! interface for reading every record of a given type from an external system
//! of record (e.g., a ServiceNow CMDB).
//!
//! Each concrete provider implementation should implement [`RecordProvider`]
//! to handle vendor-specific authentication, pagination and decoding.
//!
//! The trait is designed for async usage and supports dynamic dispatch
//! (`dyn RecordProvider`) for runtime selection of providers.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use record_provider::models::{record::ExternalRecord, request_params::RecordsRequest};
//! use record_provider::providers::{ProviderError, RecordProvider};
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl RecordProvider for MyProvider {
//!     fn name(&self) -> &'static str {
//!         "mine"
//!     }
//!
//!     async fn fetch_records(
//!         &self,
//!         _request: &RecordsRequest,
//!     ) -> Result<Vec<ExternalRecord>, ProviderError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod servicenow;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{record::ExternalRecord, request_params::RecordsRequest};

/// Trait for reading records from a system of record.
#[async_trait]
pub trait RecordProvider {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Fetches every record matching the request, following pagination to
    /// the end.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<ExternalRecord>)` - All records, in the order the source returned them.
    /// * `Err(ProviderError)` - If any page fails. Partial results are discarded.
    async fn fetch_records(
        &self,
        request: &RecordsRequest,
    ) -> Result<Vec<ExternalRecord>, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// A required provider setting is absent or invalid.
    #[snafu(display("Invalid provider setting `{name}`: {message}"))]
    InvalidSetting {
        name: String,
        message: String,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a `RecordProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Request {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The provider's API answered with a non-success status.
    #[snafu(display("API error ({status}): {message}"))]
    Api {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// The response body could not be decoded.
    #[snafu(display("Failed to decode API response: {source}"))]
    Decode {
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    /// Obtaining credentials (e.g., an OAuth token) failed.
    #[snafu(display("Authentication failed: {message}"))]
    Auth {
        message: String,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this specific provider.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },
}
