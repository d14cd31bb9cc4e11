use crate::config::MediaConfig;
use anyhow::Context;
use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Failure to publish a file on the media host
#[derive(Debug, Error)]
pub enum UploadError {
    /// Nothing to upload
    #[error("no file supplied")]
    EmptyFile,
    /// The media host could not be reached
    #[error("media host request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The media host answered with an error
    #[error("media host rejected upload ({status}): {message}")]
    Host { status: u16, message: String },
    /// The media host answered without a public URL
    #[error("media host response did not include a secure_url")]
    MissingUrl,
}

/// External host that turns uploaded bytes into a public URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Publish `data` and return its secure public URL
    async fn upload(&self, data: Bytes) -> Result<String, UploadError>;
}

/// Successful upload response (only the fields we use)
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
    resource_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Cloudinary upload client using signed requests
pub struct CloudinaryUploader {
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryUploader {
    /// Create a new uploader
    pub fn new(config: &MediaConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build media host HTTP client")?;

        // resource_type "auto" lets the host detect image/video/raw
        let upload_url = format!(
            "{}/{}/auto/upload",
            config.api_base_url.trim_end_matches('/'),
            config.cloud_name
        );

        if !config.has_credentials() {
            warn!("Cloudinary credentials are incomplete, uploads will be rejected by the host");
        }

        info!(cloud_name = %config.cloud_name, "Cloudinary uploader initialized");

        Ok(Self {
            client,
            upload_url,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn signed_form(&self, data: Bytes) -> Form {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_params(&[("timestamp", timestamp.as_str())], &self.api_secret);
        let length = data.len() as u64;

        Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .part("file", Part::stream_with_length(data, length).file_name("file"))
    }

    async fn send(&self, data: Bytes) -> Result<String, UploadError> {
        let response = self
            .client
            .post(&self.upload_url)
            .multipart(self.signed_form(data))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(UploadError::Host {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadResponse = response.json().await?;
        debug!(
            public_id = ?body.public_id,
            resource_type = ?body.resource_type,
            "Media host accepted upload"
        );
        body.secure_url.ok_or(UploadError::MissingUrl)
    }
}

#[async_trait]
impl MediaHost for CloudinaryUploader {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn upload(&self, data: Bytes) -> Result<String, UploadError> {
        if data.is_empty() {
            return Err(UploadError::EmptyFile);
        }

        let result = self.send(data).await;

        match &result {
            Ok(url) => {
                info!(secure_url = %url, "File uploaded to media host");
                metrics::counter!("media.uploads").increment(1);
            }
            Err(_) => metrics::counter!("media.upload_failures").increment(1),
        }

        result
    }
}

/// Cloudinary request signature: SHA-1 over the key-sorted `k=v&...`
/// parameter string with the API secret appended
fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by_key(|(key, _)| *key);

    let to_sign = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
