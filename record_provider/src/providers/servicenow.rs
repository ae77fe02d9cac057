//! ServiceNow Table API provider.
//!
//! Reads CMDB configuration items through `GET /api/now/table/{type}`,
//! following the `Link: <...>; rel="next"` header until the last page.

mod auth;
pub mod params;
pub mod provider;
pub mod response;

pub use params::{AuthType, OAuthGrantType, ServiceNowConfig, ServiceNowParams};
pub use provider::ServiceNowProvider;
