use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::Store;
use crate::services::storage::AudioStorage;
use crate::tasks::queue::JobQueue;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    storage: Arc<dyn AudioStorage>,
    redis: Option<RedisHandle>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        storage: Arc<dyn AudioStorage>,
        redis: Option<RedisHandle>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, queue, storage, redis }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub(crate) fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.inner.queue
    }

    pub(crate) fn storage(&self) -> &Arc<dyn AudioStorage> {
        &self.inner.storage
    }

    /// `None` when the in-memory queue backend is used.
    pub(crate) fn redis(&self) -> Option<&RedisHandle> {
        self.inner.redis.as_ref()
    }
}
