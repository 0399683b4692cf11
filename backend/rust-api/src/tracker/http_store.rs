use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};

use crate::extractors::USER_ID_HEADER;
use crate::models::progress::SessionCountResponse;
use crate::models::{ProgressSnapshot, VideoProgress};

use super::store::ProgressStore;

const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Client-side [`ProgressStore`] backed by the progress endpoints of this API.
#[derive(Clone, Debug)]
pub struct HttpProgressStore {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpProgressStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn exercise_url(&self, exercise_id: &str, suffix: &str) -> String {
        format!(
            "{}/api/v1/exercises/{}/{}",
            self.base_url,
            utf8_percent_encode(exercise_id, PATH_SEGMENT_ENCODE_SET),
            suffix
        )
    }
}

async fn error_from(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    anyhow!("Progress API returned error {}: {}", status, error_text)
}

#[async_trait]
impl ProgressStore for HttpProgressStore {
    async fn fetch_progress(
        &self,
        user_id: &str,
        exercise_id: &str,
    ) -> Result<Option<VideoProgress>> {
        let response = self
            .client
            .get(self.exercise_url(exercise_id, "progress"))
            .header(USER_ID_HEADER, user_id)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to call progress API")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let progress = response
            .json()
            .await
            .context("Failed to parse progress response")?;
        Ok(Some(progress))
    }

    async fn upsert_progress(
        &self,
        user_id: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<VideoProgress> {
        let response = self
            .client
            .put(self.exercise_url(&snapshot.exercise_id, "progress"))
            .header(USER_ID_HEADER, user_id)
            .json(snapshot)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to call progress API")?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        response
            .json()
            .await
            .context("Failed to parse progress response")
    }

    async fn increment_session_count(&self, user_id: &str, exercise_id: &str) -> Result<u32> {
        let response = self
            .client
            .post(self.exercise_url(exercise_id, "sessions"))
            .header(USER_ID_HEADER, user_id)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to call session API")?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let body: SessionCountResponse = response
            .json()
            .await
            .context("Failed to parse session response")?;
        Ok(body.session_count)
    }
}
