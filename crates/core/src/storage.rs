//! Read access to Cloud Storage objects through the JSON API.

use std::{collections::HashMap, path::Path, sync::Arc};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    auth::{Credentials, emulator_base_url},
    error::{RelayError, Result},
};

pub const STORAGE_EMULATOR_ENV: &str = "STORAGE_EMULATOR_HOST";
pub const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download the current content of an object, overwriting `destination`.
    async fn download(&self, bucket: &str, object: &str, destination: &Path) -> Result<()>;

    /// Fresh read of the object's custom key/value metadata.
    async fn custom_metadata(&self, bucket: &str, object: &str) -> Result<HashMap<String, String>>;
}

#[derive(Deserialize)]
struct ObjectResource {
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

pub struct GcsObjectStore {
    http: reqwest::Client,
    base_url: Url,
    credentials: Arc<Credentials>,
}

impl GcsObjectStore {
    pub fn new(http: reqwest::Client, base_url: &str, credentials: Arc<Credentials>) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| RelayError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    /// Honors `STORAGE_EMULATOR_HOST`, skipping authentication when it is set.
    pub fn from_env(http: reqwest::Client, credentials: Arc<Credentials>) -> Result<Self> {
        match std::env::var(STORAGE_EMULATOR_ENV) {
            Ok(host) if !host.is_empty() => {
                let base = emulator_base_url(&host);
                info!(emulator = %base, "Using Cloud Storage emulator");
                Self::new(http, &base, Arc::new(Credentials::Anonymous))
            }
            _ => Self::new(http, DEFAULT_STORAGE_URL, credentials),
        }
    }

    pub fn object_url(&self, bucket: &str, object: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RelayError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "cannot be a base".into(),
            })?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", object]);
        Ok(url)
    }

    async fn get(&self, bucket: &str, object: &str, media: bool) -> Result<reqwest::Response> {
        let mut url = self.object_url(bucket, object)?;
        if media {
            url.query_pairs_mut().append_pair("alt", "media");
        }

        let request = self.credentials.authorize(self.http.get(url)).await?;
        let response = request.send().await?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(RelayError::ObjectNotFound {
                bucket: bucket.to_string(),
                object: object.to_string(),
            }),
            status => Err(RelayError::Storage {
                status,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn download(&self, bucket: &str, object: &str, destination: &Path) -> Result<()> {
        let bytes = self.get(bucket, object, true).await?.bytes().await?;

        tokio::fs::write(destination, &bytes)
            .await
            .map_err(|source| RelayError::WriteFailed {
                path: destination.to_path_buf(),
                source,
            })?;

        info!(
            bucket,
            object,
            destination = %destination.display(),
            size = bytes.len(),
            "Object downloaded"
        );
        Ok(())
    }

    async fn custom_metadata(&self, bucket: &str, object: &str) -> Result<HashMap<String, String>> {
        let resource: ObjectResource = self.get(bucket, object, false).await?.json().await?;
        let metadata = resource.metadata.unwrap_or_default();
        debug!(bucket, object, ?metadata, "Object metadata loaded");
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::test_support::TestServer;

    fn store(base: &str) -> GcsObjectStore {
        GcsObjectStore::new(reqwest::Client::new(), base, Arc::new(Credentials::Anonymous)).unwrap()
    }

    #[test]
    fn object_name_is_a_single_encoded_segment() {
        let url = store(DEFAULT_STORAGE_URL)
            .object_url("b1", "dir/pic 1.png")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/b1/o/dir%2Fpic%201.png"
        );
    }

    #[test]
    fn emulator_base_with_trailing_slash() {
        let url = store("http://localhost:4443/").object_url("b1", "a.png").unwrap();
        assert_eq!(url.as_str(), "http://localhost:4443/storage/v1/b/b1/o/a.png");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result =
            GcsObjectStore::new(reqwest::Client::new(), "not a url", Arc::new(Credentials::Anonymous));
        assert!(matches!(result, Err(RelayError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn download_overwrites_destination() {
        let server = TestServer::respond_with(200, "fresh bytes").await;
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("pic.png");
        std::fs::write(&destination, "stale content that is longer").unwrap();

        store(&server.url)
            .download("b1", "dir/pic.png", &destination)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"fresh bytes");
        let request = server.single_request();
        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "/storage/v1/b/b1/o/dir%2Fpic.png?alt=media");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let server = TestServer::respond_with(404, "No such object").await;
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("pic.png");

        let result = store(&server.url).download("b1", "pic.png", &destination).await;

        assert!(matches!(
            result,
            Err(RelayError::ObjectNotFound { ref bucket, ref object }) if bucket == "b1" && object == "pic.png"
        ));
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn other_failures_keep_their_status() {
        let server = TestServer::respond_with(503, "backend unavailable").await;

        let result = store(&server.url).custom_metadata("b1", "pic.png").await;

        match result {
            Err(RelayError::Storage { status, message }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(message, "backend unavailable");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reads_custom_metadata() {
        let server = TestServer::respond_with(
            200,
            r#"{"name": "pic.png", "metadata": {"rotation-angle": "270"}}"#,
        )
        .await;

        let metadata = store(&server.url).custom_metadata("b1", "pic.png").await.unwrap();

        assert_eq!(metadata["rotation-angle"], "270");
        assert_eq!(server.single_request().target, "/storage/v1/b/b1/o/pic.png");
    }

    #[test]
    fn resource_without_metadata() {
        let resource: ObjectResource =
            serde_json::from_str(r#"{"name": "a.png", "bucket": "b1"}"#).unwrap();
        assert!(resource.metadata.is_none());

        let resource: ObjectResource =
            serde_json::from_str(r#"{"metadata": {"rotation-angle": "180"}}"#).unwrap();
        assert_eq!(resource.metadata.unwrap()["rotation-angle"], "180");
    }
}
