//! HTTP client for the remote collector that receives clips.
//!
//! Each clip is posted as a multipart form with the video bytes, the channel
//! id and the shared secret. Only a 2xx response carrying a JSON `message`
//! counts as delivered.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::{Collector, CollectorAck};
use crate::domain::Clip;

/// Configuration for the collector client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Upload endpoint
    pub url: String,

    /// Shared secret sent with every upload
    #[serde(default)]
    pub secret: String,

    /// Request timeout in seconds (None = transport default)
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Multipart upload client
pub struct CollectorClient {
    url: String,
    secret: String,
    client: reqwest::Client,
}

impl CollectorClient {
    pub fn new(config: CollectorConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            url: config.url,
            secret: config.secret,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn build_form(&self, clip: &Clip) -> Result<Form> {
        let bytes = tokio::fs::read(&clip.path)
            .await
            .with_context(|| format!("Failed to read clip {}", clip.path.display()))?;

        let video = Part::bytes(bytes)
            .file_name(clip.file_name())
            .mime_str("video/mp4")?;

        Ok(Form::new()
            .part("video", video)
            .text("camId", clip.channel_id.to_string())
            .text("secret", self.secret.clone()))
    }
}

#[async_trait]
impl Collector for CollectorClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn upload(&self, clip: &Clip) -> Result<CollectorAck> {
        let form = self.build_form(clip).await?;

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Failed to send {} to collector", clip.file_name()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Collector rejected upload ({}): {}", status, body.trim());
        }

        response
            .json::<CollectorAck>()
            .await
            .context("Failed to parse collector acknowledgment")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn config(url: &str) -> CollectorConfig {
        CollectorConfig {
            url: url.to_string(),
            secret: "shared".to_string(),
            timeout_seconds: Some(5),
        }
    }

    #[test]
    fn test_ack_parsing() {
        let ack: CollectorAck = serde_json::from_str(r#"{"message":"ok","id":7}"#).unwrap();
        assert_eq!(ack.message, "ok");
        assert!(serde_json::from_str::<CollectorAck>(r#"{"status":"ok"}"#).is_err());
    }

    #[tokio::test]
    async fn test_missing_clip_fails_before_sending() {
        let temp = TempDir::new().unwrap();
        let client = CollectorClient::new(config("http://127.0.0.1:9/upload")).unwrap();
        let clip = Clip::new(
            9,
            Utc.timestamp_millis_opt(1_700_000_000_000).single().unwrap(),
            temp.path(),
        );

        let err = client.upload(&clip).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read clip"));
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_an_error() {
        let temp = TempDir::new().unwrap();
        let clip = Clip::new(
            9,
            Utc.timestamp_millis_opt(1_700_000_000_000).single().unwrap(),
            temp.path(),
        );
        tokio::fs::write(&clip.path, b"fake mp4").await.unwrap();

        // Port 9 (discard) is not listening on loopback
        let client = CollectorClient::new(config("http://127.0.0.1:9/upload")).unwrap();
        assert!(client.upload(&clip).await.is_err());
        assert!(clip.path.exists());
    }
}
