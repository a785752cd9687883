use std::{path::Path, time::Duration};

use async_trait::async_trait;
use reqwest::Url;
use tracing::info;

use crate::error::{RelayError, Result};

pub const DEFAULT_SERVICE_URL: &str = "https://image-transform-dwyfq6br7q-lz.a.run.app/rotate";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub service_url: String,
    pub request_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Rotate the image at `source` by `angle` degrees and write the result to `destination`.
    async fn rotate(&self, source: &Path, destination: &Path, angle: &str) -> Result<()>;
}

/// Remote rotation service reached over HTTP: `POST <service_url>/<angle>` with raw PNG bytes.
pub struct HttpImageProcessor {
    http: reqwest::Client,
    service_url: Url,
    request_timeout: Duration,
}

impl HttpImageProcessor {
    pub fn new(http: reqwest::Client, config: ProcessorConfig) -> Result<Self> {
        let service_url = Url::parse(&config.service_url).map_err(|e| RelayError::InvalidUrl {
            url: config.service_url.clone(),
            reason: e.to_string(),
        })?;
        if service_url.cannot_be_a_base() {
            return Err(RelayError::InvalidUrl {
                url: config.service_url,
                reason: "cannot be a base".into(),
            });
        }

        Ok(Self {
            http,
            service_url,
            request_timeout: config.request_timeout,
        })
    }

    pub fn rotate_url(&self, angle: &str) -> Url {
        let mut url = self.service_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(angle);
        }
        url
    }
}

#[async_trait]
impl ImageProcessor for HttpImageProcessor {
    async fn rotate(&self, source: &Path, destination: &Path, angle: &str) -> Result<()> {
        let body = tokio::fs::read(source).await?;
        let url = self.rotate_url(angle);

        let response = self
            .http
            .post(url.clone())
            .header("Content-Type", "image/png")
            .timeout(self.request_timeout)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Processor {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }

        let rotated = response.bytes().await?;

        if let Some(parent) = destination.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| RelayError::WriteFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(destination, &rotated)
            .await
            .map_err(|source| RelayError::WriteFailed {
                path: destination.to_path_buf(),
                source,
            })?;

        info!(
            %url,
            destination = %destination.display(),
            size = rotated.len(),
            "Rotated image saved"
        );
        Ok(())
    }
}
