use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::redis::RedisHealth;
use crate::core::state::AppState;
use crate::schemas::HealthResponse;

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    match state.redis() {
        None => {
            components.insert("queue".to_string(), "in-memory".to_string());
        }
        Some(redis) => match redis.health().await {
            RedisHealth::Healthy => {
                components.insert("redis".to_string(), "healthy".to_string());
            }
            RedisHealth::Disconnected => {
                components.insert("redis".to_string(), "disconnected".to_string());
                status = "degraded".to_string();
            }
            RedisHealth::Unhealthy(error) => {
                components.insert("redis".to_string(), format!("unhealthy: {error}"));
                status = "degraded".to_string();
            }
        },
    }

    match state.store().ping().await {
        Ok(()) => {
            components.insert("database".to_string(), "healthy".to_string());
        }
        Err(err) => {
            components.insert("database".to_string(), format!("unhealthy: {err}"));
            status = "unhealthy".to_string();
        }
    }

    Json(HealthResponse { service: "exam-pipeline".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
