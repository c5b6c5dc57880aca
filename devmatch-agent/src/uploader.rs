//! HTTPS transport for the stats reports.

use crate::config::UploadConfig;
use anyhow::{Context, Result};
use devmatch_core::{CoreError, StatsReport};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const FINGERPRINT_HEADER: &str = "X-Fingerprint";

pub struct Uploader {
    client: reqwest::Client,
    api_base: String,
    fingerprint: String,
}

impl Uploader {
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            fingerprint: config.client_cert_fingerprint.clone(),
        })
    }

    pub fn endpoint(&self, api: &str) -> String {
        format!("{}{}", self.api_base, api)
    }

    /// Posts the report; empty reports are not sent. Returns the HTTP status.
    pub async fn upload(&self, report: &StatsReport) -> Result<Option<u16>> {
        if report.is_empty() {
            debug!(api = report.api, "Nothing to upload");
            return Ok(None);
        }
        let url = self.endpoint(report.api);
        let response = self
            .client
            .post(&url)
            .header(FINGERPRINT_HEADER, &self.fingerprint)
            .json(&report.entries)
            .send()
            .await
            .with_context(|| format!("Upload to {} failed", url))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            warn!(url = %url, status, "Upload rejected");
            return Err(CoreError::Transport { status }.into());
        }
        info!(url = %url, status, entries = report.len(), "Upload completed");
        Ok(Some(status))
    }
}
