use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::Principal;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::attempt::{AttemptResponse, AudioUploadResponse, SubmitRequest};
use crate::schemas::results::StudentResultsResponse;
use crate::services::attempts::{self, SubmittedAnswer};
use crate::services::results;

const AUDIO_FIELD: &str = "file";

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(get_attempt))
        .route("/:attempt_id/results", get(attempt_results))
        .route("/:attempt_id/submit", post(submit_attempt))
        .route("/:attempt_id/answers/:question_id/audio", post(upload_answer_audio))
}

pub(crate) async fn start_attempt(
    Path(exam_id): Path<String>,
    Principal(student_id): Principal,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    let attempt =
        attempts::start_attempt(&state, &exam_id, &student_id, primitive_now_utc()).await?;
    Ok((StatusCode::CREATED, Json(attempt.into())))
}

async fn get_attempt(
    Path(attempt_id): Path<String>,
    Principal(student_id): Principal,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt =
        attempts::read_attempt(&state, &attempt_id, &student_id, primitive_now_utc()).await?;
    Ok(Json(attempt.into()))
}

async fn attempt_results(
    Path(attempt_id): Path<String>,
    Principal(student_id): Principal,
    State(state): State<AppState>,
) -> Result<Json<StudentResultsResponse>, ApiError> {
    let report =
        results::attempt_results(&state, &attempt_id, &student_id, primitive_now_utc()).await?;
    Ok(Json(report.into()))
}

async fn submit_attempt(
    Path(attempt_id): Path<String>,
    Principal(student_id): Principal,
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let answers = payload
        .answers
        .into_iter()
        .map(|answer| SubmittedAnswer {
            question_id: answer.question_id,
            answer_text: answer.answer_text,
            selected_option_index: answer.selected_option_index,
            audio_keys: answer.audio_keys,
        })
        .collect();
    let attempt =
        attempts::submit_attempt(&state, &attempt_id, &student_id, answers, primitive_now_utc())
            .await?;

    Ok((StatusCode::ACCEPTED, Json(attempt.into())))
}

async fn upload_answer_audio(
    Path((attempt_id, question_id)): Path<(String, String)>,
    Principal(student_id): Principal,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AudioUploadResponse>), ApiError> {
    let max_mb = state.settings().storage().max_audio_upload_mb;
    let max_bytes = max_mb * 1024 * 1024;
    let mut audio: Option<Vec<u8>> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read audio".to_string()))?
        {
            if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(ApiError::BadRequest(format!("Audio exceeds {max_mb}MB limit")));
            }
            bytes.extend_from_slice(&chunk);
        }
        audio = Some(bytes);
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("Audio file is required".to_string()))?;
    let stored = attempts::store_answer_audio(
        &state,
        &attempt_id,
        &student_id,
        &question_id,
        audio,
        primitive_now_utc(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(stored.into())))
}
