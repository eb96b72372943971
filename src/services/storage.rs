use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};

use crate::core::config::Settings;
use crate::services::errors::ServiceError;

pub(crate) const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredObject {
    pub(crate) key: String,
    pub(crate) size: i64,
    pub(crate) sha256: String,
}

impl StoredObject {
    fn describe(key: &str, bytes: &[u8]) -> Self {
        Self {
            key: key.to_string(),
            size: bytes.len() as i64,
            sha256: hex::encode(Sha256::digest(bytes)),
        }
    }
}

/// Read-by-key / write-by-key blob store for synthesized and recorded audio.
#[async_trait]
pub(crate) trait AudioStorage: Send + Sync {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, ServiceError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, ServiceError>;
}

pub(crate) fn question_audio_key(question_id: &str) -> String {
    format!("tts/{question_id}.mp3")
}

pub(crate) fn answer_audio_key(exam_id: &str, student_id: &str, question_id: &str) -> String {
    format!("answers/{exam_id}/{student_id}/{question_id}.mp3")
}

/// S3 when credentials are configured, the local audio directory otherwise.
pub(crate) async fn from_settings(settings: &Settings) -> Arc<dyn AudioStorage> {
    match S3AudioStorage::from_settings(settings).await {
        Some(s3) => {
            tracing::info!(bucket = %settings.s3().bucket, "Using S3 audio storage");
            Arc::new(s3)
        }
        None => {
            tracing::info!(dir = %settings.storage().local_audio_dir, "Using local audio storage");
            Arc::new(LocalAudioStorage::new(&settings.storage().local_audio_dir))
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct S3AudioStorage {
    client: Client,
    bucket: String,
}

impl S3AudioStorage {
    pub(crate) async fn from_settings(settings: &Settings) -> Option<Self> {
        if !settings.s3().is_configured() {
            return None;
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "exam-pipeline-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(settings.s3().endpoint.clone())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        Some(Self { client: Client::new(&config), bucket: settings.s3().bucket.clone() })
    }
}

#[async_trait]
impl AudioStorage for S3AudioStorage {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, ServiceError> {
        let stored = StoredObject::describe(key, &bytes);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .metadata("sha256", &stored.sha256)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| ServiceError::Transport(DisplayErrorContext(&err).to_string()))?;

        Ok(stored)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ServiceError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| ServiceError::Transport(DisplayErrorContext(&err).to_string()))?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|err| ServiceError::Transport(err.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LocalAudioStorage {
    root: PathBuf,
}

impl LocalAudioStorage {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ServiceError> {
        let relative = Path::new(key);
        let safe = relative.components().all(|component| matches!(component, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(ServiceError::Malformed(format!("invalid storage key `{key}`")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AudioStorage for LocalAudioStorage {
    async fn put(
        &self,
        key: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, ServiceError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| ServiceError::Transport(err.to_string()))?;
        }

        let stored = StoredObject::describe(key, &bytes);
        tokio::fs::write(&path, bytes).await.map_err(|err| ServiceError::Transport(err.to_string()))?;
        Ok(stored)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                ServiceError::Status { status: 404, body: format!("no object at `{key}`") }
            }
            _ => ServiceError::Transport(err.to_string()),
        })
    }
}
