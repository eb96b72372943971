use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use validator::Validate;

use crate::api::attempts;
use crate::api::errors::ApiError;
use crate::api::guards::Principal;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::types::ExamStatus;
use crate::repositories::QuestionContent;
use crate::schemas::exam::{
    EnrichmentResponse, ExamCreate, ExamResponse, PublishRejectedResponse, PublishRequest,
    PublishResponse, QuestionCreate, QuestionStatusResponse, QuestionsStatusResponse,
};
use crate::schemas::results::ExamResultsResponse;
use crate::services::publishing::{self, ExamDraft, PublishOutcome, QuestionDraft};
use crate::services::results;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam))
        .route("/:exam_id/questions", post(create_question))
        .route("/:exam_id/questions/status", get(questions_status))
        .route("/:exam_id/enrichment", post(request_enrichment))
        .route("/:exam_id/publish", post(publish_exam))
        .route("/:exam_id/archive", post(archive_exam))
        .route("/:exam_id/attempts", post(attempts::start_attempt))
        .route("/:exam_id/results", get(exam_results))
}

async fn create_exam(
    Principal(teacher_id): Principal,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let draft = ExamDraft {
        teacher_id,
        title: payload.title,
        description: payload.description,
        start_time: payload.start_time.map(to_primitive_utc),
        end_time: payload.end_time.map(to_primitive_utc),
        duration_minutes: payload.duration_minutes,
        points_total: payload.points_total,
    };
    let exam = publishing::create_exam(&state, draft, primitive_now_utc()).await?;

    Ok((StatusCode::CREATED, Json(exam.into())))
}

async fn create_question(
    Path(exam_id): Path<String>,
    Principal(teacher_id): Principal,
    State(state): State<AppState>,
    Json(payload): Json<QuestionCreate>,
) -> Result<(StatusCode, Json<QuestionStatusResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let draft = QuestionDraft {
        exam_id,
        teacher_id,
        order_index: payload.order_index,
        text: payload.text,
        question_type: payload.question_type,
        options: payload.options,
        correct_option_index: payload.correct_option_index,
        marks: payload.marks,
        expected_answer: payload.expected_answer,
        requires_audio: payload.requires_audio,
    };
    let question = publishing::create_question(&state, draft, primitive_now_utc()).await?;

    Ok((StatusCode::CREATED, Json(question.into())))
}

async fn questions_status(
    Path(exam_id): Path<String>,
    Principal(teacher_id): Principal,
    State(state): State<AppState>,
) -> Result<Json<QuestionsStatusResponse>, ApiError> {
    let questions = publishing::question_status(&state, &exam_id, &teacher_id).await?;
    let pending = questions.iter().filter(|question| !question.is_ready_for_publish).count();

    Ok(Json(QuestionsStatusResponse {
        exam_id,
        total: questions.len(),
        pending,
        questions: questions.into_iter().map(QuestionStatusResponse::from).collect(),
    }))
}

async fn request_enrichment(
    Path(exam_id): Path<String>,
    Principal(teacher_id): Principal,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<EnrichmentResponse>), ApiError> {
    let jobs_enqueued = publishing::request_enrichment(&state, &exam_id, &teacher_id).await?;
    Ok((StatusCode::ACCEPTED, Json(EnrichmentResponse { exam_id, jobs_enqueued })))
}

async fn publish_exam(
    Path(exam_id): Path<String>,
    Principal(teacher_id): Principal,
    State(state): State<AppState>,
    payload: Option<Json<PublishRequest>>,
) -> Result<Response, ApiError> {
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let finalized = payload
        .questions
        .into_iter()
        .map(|question| QuestionContent {
            question_id: question.question_id,
            text: question.text,
            options: question.options,
            order_index: question.order_index,
        })
        .collect();

    let outcome =
        publishing::publish_exam(&state, &exam_id, &teacher_id, finalized, primitive_now_utc())
            .await?;

    let response = match outcome {
        PublishOutcome::Published { enrichment_jobs } => Json(PublishResponse {
            exam_id,
            status: ExamStatus::Published,
            enrichment_jobs,
        })
        .into_response(),
        PublishOutcome::Rejected { pending } => (
            StatusCode::CONFLICT,
            Json(PublishRejectedResponse {
                status: StatusCode::CONFLICT.as_u16(),
                detail: format!("{pending} question(s) are still being prepared"),
                pending_questions: pending,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

async fn archive_exam(
    Path(exam_id): Path<String>,
    Principal(teacher_id): Principal,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    publishing::archive_exam(&state, &exam_id, &teacher_id, primitive_now_utc()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn exam_results(
    Path(exam_id): Path<String>,
    Principal(teacher_id): Principal,
    State(state): State<AppState>,
) -> Result<Json<ExamResultsResponse>, ApiError> {
    let report = results::exam_results(&state, &exam_id, &teacher_id).await?;
    Ok(Json(report.into()))
}
