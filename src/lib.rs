pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::config::{QueueBackend, Settings};
use crate::core::{redis::RedisHandle, state::AppState, telemetry};
use crate::repositories::PgStore;
use crate::tasks::queue::{InMemoryJobQueue, JobQueue, RedisJobQueue};
use crate::tasks::scheduler::{PipelineServices, WorkerRuntime};

async fn build_state(settings: Settings) -> anyhow::Result<AppState> {
    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let (queue, redis): (Arc<dyn JobQueue>, Option<RedisHandle>) = match settings.queue().backend {
        QueueBackend::Redis => {
            let redis = RedisHandle::new(settings.redis().redis_url());
            if let Err(err) = redis.connect().await {
                tracing::error!(error = %err, "Failed to connect to Redis; jobs cannot be scheduled until it recovers");
            } else {
                tracing::info!("Redis connected successfully");
            }
            let queue = RedisJobQueue::new(redis.clone(), settings.queue().key_prefix.clone());
            (Arc::new(queue), Some(redis))
        }
        QueueBackend::Memory => {
            tracing::warn!("Using the in-memory job queue; pending jobs are lost on restart");
            (Arc::new(InMemoryJobQueue::new()), None)
        }
    };

    let storage = services::storage::from_settings(&settings).await;
    Ok(AppState::new(settings, Arc::new(PgStore::new(db_pool)), queue, storage, redis))
}

async fn disconnect(state: &AppState) {
    if let Some(redis) = state.redis() {
        redis.disconnect().await;
        tracing::info!("Redis disconnected");
    }
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings, "exam-pipeline")?;
    core::metrics::init(&settings)?;

    let state = build_state(settings).await?;

    let embedded = state.settings().queue().backend == QueueBackend::Memory
        || state.settings().queue().embedded_workers;
    let workers = if embedded {
        let services = PipelineServices::from_settings(&state)?;
        tracing::info!("Starting embedded pipeline workers");
        Some(WorkerRuntime::start(&state, services))
    } else {
        None
    };

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Exam pipeline API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    if let Some(workers) = workers {
        workers.stop().await;
    }
    disconnect(&state).await;

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings, "exam-worker")?;
    core::metrics::init(&settings)?;

    if settings.queue().backend == QueueBackend::Memory {
        tracing::warn!("Standalone worker with the in-memory queue only sees its own jobs");
    }

    let state = build_state(settings).await?;
    let result = tasks::scheduler::run(state.clone()).await;

    disconnect(&state).await;

    result?;

    Ok(())
}
