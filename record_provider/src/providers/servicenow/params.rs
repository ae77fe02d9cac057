use std::{fmt, num::NonZeroU32};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use indexmap::{IndexMap, IndexSet};
use nonzero_ext::nonzero;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Page size used when the config leaves `page_size` unset or zero.
pub const DEFAULT_PAGE_SIZE: NonZeroU32 = nonzero!(10_000u32);

/// Unique id field every ServiceNow table exposes.
pub const ID_FIELD: &str = "sys_id";

static LAST_UPDATE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$\{lastUpdateDate\}").expect("date placeholder pattern is valid"));
static LAST_UPDATE_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$\{lastUpdateTime\}").expect("time placeholder pattern is valid"));

/// How requests are authenticated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    Basic,
    Oauth,
}

/// OAuth grant used to obtain a bearer token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthGrantType {
    #[default]
    Password,
    ClientCredentials,
}

/// Connection settings for a ServiceNow instance.
///
/// Secrets may be omitted here and supplied through the environment instead
/// (`CMDB_SNOW_API_USER`, `CMDB_SNOW_API_PASSWORD`, `CMDB_SNOW_OAUTH_CLIENT_ID`,
/// `CMDB_SNOW_OAUTH_CLIENT_SECRET`).
#[derive(Clone, Default, Deserialize)]
pub struct ServiceNowConfig {
    /// Instance base URL, e.g. `https://acme.service-now.com`.
    pub api_url: String,
    #[serde(default)]
    pub api_user: Option<String>,
    #[serde(default)]
    pub api_password: Option<String>,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub oauth_grant_type: OAuthGrantType,
    /// Defaults to `{api_url}/oauth_token.do`.
    #[serde(default)]
    pub oauth_token_url: Option<String>,
    #[serde(default)]
    pub oauth_client_id: Option<String>,
    #[serde(default)]
    pub oauth_client_secret: Option<String>,
    #[serde(default)]
    pub oauth_scopes: Vec<String>,
    /// Records per page (`sysparm_limit`).
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Client-side throttle for page requests. Unset means unthrottled.
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

impl fmt::Debug for ServiceNowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ServiceNowConfig")
            .field("api_url", &self.api_url)
            .field("api_user", &self.api_user)
            .field("api_password", &redact(&self.api_password))
            .field("auth_type", &self.auth_type)
            .field("oauth_grant_type", &self.oauth_grant_type)
            .field("oauth_token_url", &self.oauth_token_url)
            .field("oauth_client_id", &self.oauth_client_id)
            .field("oauth_client_secret", &redact(&self.oauth_client_secret))
            .field("oauth_scopes", &self.oauth_scopes)
            .field("page_size", &self.page_size)
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

/// ServiceNow-specific options of a mapping's external query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceNowParams {
    /// IANA timezone the instance renders dates in. Placeholders in the
    /// filter are expanded in this zone; UTC when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timezone: Option<String>,

    /// Extra URL query parameters appended to the first request
    /// (e.g. `sysparm_display_value = "true"`).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub url_query_params: IndexMap<String, String>,
}

/// Replaces `${lastUpdateDate}` and `${lastUpdateTime}` (case-insensitive) in
/// `filter` with `last_sync` rendered in `server_timezone`.
pub fn expand_placeholders(
    filter: &str,
    last_sync: DateTime<Utc>,
    server_timezone: Option<&str>,
) -> Result<String, String> {
    let tz: Tz = match server_timezone.map(str::trim) {
        Some(name) if !name.is_empty() => name
            .parse()
            .map_err(|e| format!("invalid server timezone `{name}`: {e}"))?,
        _ => Tz::UTC,
    };

    let local = last_sync.with_timezone(&tz);
    let date = local.format("%Y-%m-%d").to_string();
    let time = local.format("%H:%M:%S").to_string();

    let s = LAST_UPDATE_DATE_RE.replace_all(filter, date.as_str());
    Ok(LAST_UPDATE_TIME_RE
        .replace_all(&s, time.as_str())
        .into_owned())
}

/// Reduces attribute paths to the top-level fields the table API can return,
/// with [`ID_FIELD`] first and duplicates removed.
pub fn requested_fields(paths: &[String]) -> Vec<String> {
    let mut fields = IndexSet::new();
    fields.insert(ID_FIELD.to_string());
    for path in paths {
        let top = path.split('.').next().unwrap_or_default().trim();
        if !top.is_empty() {
            fields.insert(top.to_string());
        }
    }
    fields.into_iter().collect()
}
