use std::time::Duration;

use serde::Deserialize;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

use crate::error::{RelayError, Result};

pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// How requests to Google APIs are authorized.
pub enum Credentials {
    /// No `Authorization` header; used against local emulators.
    Anonymous,
    AccessToken(String),
    MetadataServer(MetadataServerTokens),
}

impl Credentials {
    /// Static token from the environment if set, otherwise the instance metadata server.
    pub fn from_env(http: reqwest::Client) -> Self {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => {
                debug!(env_var = ACCESS_TOKEN_ENV, "Using access token from environment");
                Credentials::AccessToken(token.trim().to_string())
            }
            _ => {
                let host = std::env::var(METADATA_HOST_ENV)
                    .unwrap_or_else(|_| DEFAULT_METADATA_HOST.to_string());
                debug!(metadata_host = %host, "Using metadata server credentials");
                Credentials::MetadataServer(MetadataServerTokens::new(http, host))
            }
        }
    }

    pub async fn bearer_token(&self) -> Result<Option<String>> {
        match self {
            Credentials::Anonymous => Ok(None),
            Credentials::AccessToken(token) => Ok(Some(token.clone())),
            Credentials::MetadataServer(tokens) => tokens.token().await.map(Some),
        }
    }

    /// Attach the bearer token, if any, to an outgoing request.
    pub async fn authorize(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.bearer_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }
}

/// Emulator hosts are usually given as `host:port`; a value with a scheme is kept as-is.
pub fn emulator_base_url(host: &str) -> String {
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

pub struct MetadataServerTokens {
    http: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataServerTokens {
    pub fn new(http: reqwest::Client, host: String) -> Self {
        Self {
            http,
            url: format!("http://{}{}", host, TOKEN_PATH),
            cached: Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| RelayError::Credentials {
                reason: format!(
                    "{} is not set and the metadata server is unreachable: {}",
                    ACCESS_TOKEN_ENV, e
                ),
            })?;

        if !response.status().is_success() {
            return Err(RelayError::Credentials {
                reason: format!("metadata server responded with {}", response.status()),
            });
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        debug!(expires_in = token.expires_in, "Fetched access token from metadata server");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn anonymous_adds_no_token() {
        assert_eq!(Credentials::Anonymous.bearer_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        let creds = Credentials::AccessToken("ya29.token".into());
        assert_eq!(
            creds.bearer_token().await.unwrap(),
            Some("ya29.token".to_string())
        );
    }

    #[test]
    fn emulator_host_gets_scheme_once() {
        assert_eq!(emulator_base_url("localhost:8085"), "http://localhost:8085");
        assert_eq!(emulator_base_url("http://localhost:8085"), "http://localhost:8085");
        assert_eq!(emulator_base_url("https://emu.internal"), "https://emu.internal");
    }

    #[test]
    fn metadata_url_includes_token_path() {
        let tokens = MetadataServerTokens::new(reqwest::Client::new(), "localhost:8080".into());
        assert_eq!(
            tokens.url,
            "http://localhost:8080/computeMetadata/v1/instance/service-accounts/default/token"
        );
    }
}
