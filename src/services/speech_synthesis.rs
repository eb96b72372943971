use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::core::config::Settings;
use crate::services::errors::{ensure_success, ServiceError};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SynthesisRequest<'a> {
    pub(crate) question_id: &'a str,
    pub(crate) text: &'a str,
    pub(crate) language: &'a str,
    pub(crate) slow: bool,
}

#[async_trait]
pub(crate) trait SpeechSynthesizer: Send + Sync {
    /// Returns encoded audio (mp3) for the request text.
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Debug, Clone)]
pub(crate) struct HttpSpeechSynthesizer {
    client: Client,
    base_url: String,
}

impl HttpSpeechSynthesizer {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(settings.tts().timeout_seconds))
            .build()
            .context("Failed to build TTS HTTP client")?;

        Ok(Self { client, base_url: settings.tts().base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, ServiceError> {
        if self.base_url.is_empty() {
            return Err(ServiceError::Disabled("speech synthesis"));
        }

        let response = self
            .client
            .post(format!("{}/tts/synthesize", self.base_url))
            .json(request)
            .send()
            .await?;
        let bytes = ensure_success(response).await?.bytes().await?;
        if bytes.is_empty() {
            return Err(ServiceError::Malformed("empty audio body".to_string()));
        }

        Ok(bytes.to_vec())
    }
}
