//! Blob storage over HTTP.
//!
//! Uploads go to `{base_url}/object/{bucket}/{path}` with upsert enabled, so
//! re-running a request overwrites the same object. The returned locator is
//! the public object URL.

use super::{object_path, storage_error, ArtifactStore};
use crate::error::PipelineError;
use crate::models::Locator;
use crate::report::Artifact;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub struct RemoteStore {
    base_url: String,
    bucket: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl RemoteStore {
    pub fn new(
        base_url: &str,
        bucket: &str,
        api_key: Option<String>,
        timeout_seconds: u64,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, self.bucket, path)
    }
}

#[async_trait]
impl ArtifactStore for RemoteStore {
    fn name(&self) -> &str {
        "remote"
    }

    async fn store(&self, request_id: &str, artifact: &Artifact) -> Result<Locator, PipelineError> {
        let path = object_path(request_id, artifact);

        let mut request = self
            .http_client
            .post(self.upload_url(&path))
            .header("content-type", artifact.content_type())
            .header("x-upsert", "true")
            .body(artifact.bytes.clone());
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                storage_error(artifact, "upload timed out")
            } else if e.is_connect() {
                storage_error(artifact, format!("cannot reach {}", self.base_url))
            } else {
                storage_error(artifact, e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(storage_error(
                artifact,
                format!("upload rejected ({}): {}", status, body),
            ));
        }

        let url = self.public_url(&path);
        info!("Uploaded {} artifact to {}", artifact.kind, url);
        Ok(Locator(url))
    }
}
