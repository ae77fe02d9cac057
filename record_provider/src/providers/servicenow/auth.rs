use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use shared_utils::env::configured_or_env;
use snafu::{ResultExt, ensure};
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

use crate::providers::{
    AuthSnafu, InvalidSettingSnafu, MissingEnvVarSnafu, ProviderError, ProviderInitError,
    RequestSnafu,
    servicenow::params::{AuthType, OAuthGrantType, ServiceNowConfig},
};

const API_USER_ENV: &str = "CMDB_SNOW_API_USER";
const API_PASSWORD_ENV: &str = "CMDB_SNOW_API_PASSWORD";
const OAUTH_CLIENT_ID_ENV: &str = "CMDB_SNOW_OAUTH_CLIENT_ID";
const OAUTH_CLIENT_SECRET_ENV: &str = "CMDB_SNOW_OAUTH_CLIENT_SECRET";

/// Tokens are refreshed this long before the server says they expire.
const EXPIRY_SKEW: Duration = Duration::from_secs(10);

enum Credentials {
    Basic {
        user: String,
        password: SecretString,
    },
    OAuth {
        token_url: String,
        client_id: String,
        client_secret: SecretString,
        scopes: Vec<String>,
        grant: OAuthGrant,
    },
}

enum OAuthGrant {
    Password { user: String, password: SecretString },
    ClientCredentials,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds. Absent means the token does not expire.
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: SecretString,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn from_response(response: TokenResponse) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs).saturating_sub(EXPIRY_SKEW));
        Self {
            token: SecretString::new(response.access_token.into()),
            expires_at,
        }
    }

    fn is_fresh(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Attaches credentials to outgoing requests.
///
/// OAuth tokens are fetched on first use and reused until they expire or the
/// API rejects them (see [`Authenticator::invalidate`]).
pub(crate) struct Authenticator {
    credentials: Credentials,
    token: Mutex<Option<CachedToken>>,
}

fn user_and_password(config: &ServiceNowConfig) -> Result<(String, SecretString), ProviderInitError> {
    let user = configured_or_env(config.api_user.as_deref(), API_USER_ENV)
        .context(MissingEnvVarSnafu)?;
    let password = configured_or_env(config.api_password.as_deref(), API_PASSWORD_ENV)
        .context(MissingEnvVarSnafu)?;
    Ok((user, SecretString::new(password.into())))
}

impl Authenticator {
    /// Resolves credentials from the config, falling back to the environment.
    pub(crate) fn from_config(
        config: &ServiceNowConfig,
        api_url: &str,
    ) -> Result<Self, ProviderInitError> {
        let credentials = match config.auth_type {
            AuthType::Basic => {
                let (user, password) = user_and_password(config)?;
                Credentials::Basic { user, password }
            }
            AuthType::Oauth => {
                let client_id =
                    configured_or_env(config.oauth_client_id.as_deref(), OAUTH_CLIENT_ID_ENV)
                        .context(MissingEnvVarSnafu)?;
                let client_secret = configured_or_env(
                    config.oauth_client_secret.as_deref(),
                    OAUTH_CLIENT_SECRET_ENV,
                )
                .context(MissingEnvVarSnafu)?;
                let token_url = match config.oauth_token_url.as_deref().map(str::trim) {
                    Some(url) if !url.is_empty() => url.to_string(),
                    _ => format!("{api_url}/oauth_token.do"),
                };
                ensure!(
                    token_url.starts_with("http"),
                    InvalidSettingSnafu {
                        name: "oauth_token_url",
                        message: format!("not an http(s) url: {token_url}"),
                    }
                );
                let grant = match config.oauth_grant_type {
                    OAuthGrantType::Password => {
                        let (user, password) = user_and_password(config)?;
                        OAuthGrant::Password { user, password }
                    }
                    OAuthGrantType::ClientCredentials => OAuthGrant::ClientCredentials,
                };
                Credentials::OAuth {
                    token_url,
                    client_id,
                    client_secret: SecretString::new(client_secret.into()),
                    scopes: config.oauth_scopes.clone(),
                    grant,
                }
            }
        };

        Ok(Self {
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Adds the `Authorization` header to `request`.
    pub(crate) async fn authorize(
        &self,
        client: &Client,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, ProviderError> {
        match &self.credentials {
            Credentials::Basic { user, password } => {
                Ok(request.basic_auth(user, Some(password.expose_secret())))
            }
            Credentials::OAuth { .. } => {
                let mut cached = self.token.lock().await;
                let token = match cached.as_ref() {
                    Some(t) if t.is_fresh() => t.token.expose_secret().to_string(),
                    stale => {
                        if stale.is_some() {
                            debug!("servicenow oauth token expired, refreshing");
                        }
                        let fresh = self.fetch_token(client).await?;
                        let token = fresh.token.expose_secret().to_string();
                        *cached = Some(fresh);
                        token
                    }
                };
                Ok(request.bearer_auth(token))
            }
        }
    }

    /// True if a rejected request is worth retrying with a new token.
    pub(crate) fn uses_tokens(&self) -> bool {
        matches!(self.credentials, Credentials::OAuth { .. })
    }

    /// Drops the cached token so the next request fetches a new one.
    pub(crate) async fn invalidate(&self) {
        if self.token.lock().await.take().is_some() {
            debug!("discarded rejected servicenow oauth token");
        }
    }

    async fn fetch_token(&self, client: &Client) -> Result<CachedToken, ProviderError> {
        let Credentials::OAuth {
            token_url,
            client_id,
            client_secret,
            scopes,
            grant,
        } = &self.credentials
        else {
            return AuthSnafu {
                message: "token requested for non-oauth credentials",
            }
            .fail();
        };

        let mut form: Vec<(&str, String)> = Vec::new();
        match grant {
            OAuthGrant::Password { user, password } => {
                form.push(("grant_type", "password".to_string()));
                form.push(("username", user.clone()));
                form.push(("password", password.expose_secret().to_string()));
            }
            OAuthGrant::ClientCredentials => {
                form.push(("grant_type", "client_credentials".to_string()));
            }
        }
        form.push(("client_id", client_id.clone()));
        form.push(("client_secret", client_secret.expose_secret().to_string()));
        if !scopes.is_empty() {
            form.push(("scope", scopes.join(" ")));
        }

        debug!(token_url = %token_url, "requesting servicenow oauth token");

        let response = client
            .post(token_url)
            .form(&form)
            .send()
            .await
            .context(RequestSnafu)?;

        let status = response.status();
        ensure!(
            status.is_success(),
            AuthSnafu {
                message: format!("token endpoint returned {status}"),
            }
        );

        let token: TokenResponse = response.json().await.map_err(|e| {
            AuthSnafu {
                message: format!("invalid token response: {e}"),
            }
            .build()
        })?;

        Ok(CachedToken::from_response(token))
    }
}
