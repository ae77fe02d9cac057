use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{
    Client, RequestBuilder, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use serde_json::{Map, Value};
use shared_utils::paging::{Page, collect_pages, next_link};
use snafu::{ResultExt, ensure};
use tracing::{debug, warn};

use crate::{
    models::{
        record::ExternalRecord,
        request_params::{ProviderParams, RecordsRequest},
    },
    providers::{
        ApiSnafu, ClientBuildSnafu, DecodeSnafu, InvalidSettingSnafu, ProviderError,
        ProviderInitError, RecordProvider, RequestSnafu, ValidationSnafu,
        servicenow::{
            auth::Authenticator,
            params::{
                DEFAULT_PAGE_SIZE, ID_FIELD, ServiceNowConfig, ServiceNowParams,
                expand_placeholders, requested_fields,
            },
            response::TableResponse,
        },
    },
};

pub struct ServiceNowProvider {
    client: Client,
    api_url: String,
    page_size: NonZeroU32,
    auth: Authenticator,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl ServiceNowProvider {
    /// Creates a new ServiceNow provider.
    ///
    /// Credentials missing from `config` are read from the environment.
    pub fn new(config: ServiceNowConfig) -> Result<Self, ProviderInitError> {
        let api_url = config.api_url.trim().trim_end_matches('/').to_string();
        ensure!(
            !api_url.is_empty(),
            InvalidSettingSnafu {
                name: "api_url",
                message: "missing servicenow api url",
            }
        );

        let auth = Authenticator::from_config(&config, &api_url)?;

        let page_size = config
            .page_size
            .and_then(NonZeroU32::new)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let limiter = config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            api_url,
            page_size,
            auth,
            limiter,
        })
    }

    fn first_page_params(
        &self,
        fields: &[String],
        filter: Option<&str>,
        extras: Option<&ServiceNowParams>,
    ) -> Vec<(String, String)> {
        let mut params = vec![
            ("sysparm_fields".to_string(), requested_fields(fields).join(",")),
            ("sysparm_limit".to_string(), self.page_size.to_string()),
            ("sysparm_offset".to_string(), "0".to_string()),
        ];
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            params.push(("sysparm_query".to_string(), filter.to_string()));
        }
        if let Some(extras) = extras {
            params.extend(
                extras
                    .url_query_params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        params
    }

    async fn fetch_page(
        &self,
        request: RequestBuilder,
    ) -> Result<Page<Map<String, Value>>, ProviderError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let retry = request.try_clone();
        let mut response = self
            .auth
            .authorize(&self.client, request)
            .await?
            .send()
            .await
            .context(RequestSnafu)?;

        if response.status() == StatusCode::UNAUTHORIZED && self.auth.uses_tokens() {
            self.auth.invalidate().await;
            if let Some(retry) = retry {
                debug!("servicenow rejected the token, retrying with a new one");
                response = self
                    .auth
                    .authorize(&self.client, retry)
                    .await?
                    .send()
                    .await
                    .context(RequestSnafu)?;
            }
        }

        let status = response.status();
        debug!(url = %response.url(), status = %status, "servicenow page response");

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return ApiSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        let next = response
            .headers()
            .get(header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);

        let body = response.bytes().await.context(RequestSnafu)?;
        debug!(bytes = body.len(), "decoding servicenow page");
        let page: TableResponse = serde_json::from_slice(&body).context(DecodeSnafu)?;

        Ok(Page::new(page.result, next))
    }
}

#[async_trait]
impl RecordProvider for ServiceNowProvider {
    fn name(&self) -> &'static str {
        "servicenow"
    }

    async fn fetch_records(
        &self,
        request: &RecordsRequest,
    ) -> Result<Vec<ExternalRecord>, ProviderError> {
        let query = &request.query;
        let record_type = query.record_type.trim();
        ensure!(
            !record_type.is_empty(),
            ValidationSnafu {
                message: "missing record type",
            }
        );

        let extras = match &query.provider_specific {
            ProviderParams::ServiceNow(p) => Some(p),
            ProviderParams::None => None,
        };

        let filter = match (query.filter.as_deref(), request.last_sync) {
            (Some(filter), Some(last_sync)) if !filter.is_empty() => Some(
                expand_placeholders(
                    filter,
                    last_sync,
                    extras.and_then(|p| p.server_timezone.as_deref()),
                )
                .map_err(|message| {
                    ValidationSnafu {
                        message: format!("query datetime substitution failed: {message}"),
                    }
                    .build()
                })?,
            ),
            (filter, _) => filter.map(str::to_string),
        };

        let url = format!("{}/api/now/table/{record_type}", self.api_url);
        let params = self.first_page_params(&request.fields, filter.as_deref(), extras);

        debug!(url = %url, record_type, "reading servicenow records");

        let this = self;
        let first_url = url.as_str();
        let first_params = &params;
        let collected = collect_pages(move |next: Option<String>| {
            let builder = match next {
                None => this.client.get(first_url).query(first_params),
                Some(next_url) => this.client.get(next_url),
            };
            this.fetch_page(builder)
        })
        .await?;

        debug!(
            pages = collected.pages,
            items = collected.items.len(),
            "read servicenow records"
        );

        let mut records = Vec::with_capacity(collected.items.len());
        for item in collected.items {
            let id = match item.get(ID_FIELD) {
                Some(Value::String(id)) => id.clone(),
                Some(_) => {
                    warn!("skipping record with non-string {ID_FIELD}");
                    continue;
                }
                None => {
                    warn!("skipping record with no {ID_FIELD}");
                    continue;
                }
            };
            records.push(ExternalRecord::from_json(id, item));
        }

        Ok(records)
    }
}
