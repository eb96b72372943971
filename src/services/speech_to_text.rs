use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use crate::core::config::Settings;
use crate::services::errors::{ensure_success, ServiceError};

#[async_trait]
pub(crate) trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct HttpSpeechToText {
    client: Client,
    base_url: String,
}

impl HttpSpeechToText {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(settings.stt().timeout_seconds))
            .build()
            .context("Failed to build STT HTTP client")?;

        Ok(Self { client, base_url: settings.stt().base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, ServiceError> {
        if self.base_url.is_empty() {
            return Err(ServiceError::Disabled("speech-to-text"));
        }

        let part = Part::bytes(audio).file_name(file_name.to_string()).mime_str("audio/mpeg")?;
        let form = Form::new().part("audio", part);
        let response = self
            .client
            .post(format!("{}/stt/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let body: TranscriptionResponse = ensure_success(response).await?.json().await?;

        body.text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ServiceError::Malformed("empty transcription".to_string()))
    }
}
