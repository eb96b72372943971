use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::services::errors::{ensure_success, ServiceError};

const EVALUATION_SYSTEM_PROMPT: &str = r#"You are an exam evaluator. Grade the student's answer.
Respond with ONLY a raw JSON object of the form {"score": <number>, "feedback": <string>}.
Use the full score range, be strict but fair, and weigh correctness, completeness,
relevance and clarity. When no expected answer is given, rely on your own knowledge."#;

const RUBRIC_SYSTEM_PROMPT: &str = r#"You write grading rubrics for exam questions.
Respond with ONLY a raw JSON object of the form
{"criteria": [{"name": <string>, "marks": <number>, "description": <string>}]}
whose marks add up to the question's total."#;

#[derive(Debug, Clone)]
pub(crate) struct EvaluationRequest<'a> {
    pub(crate) question_text: &'a str,
    pub(crate) expected_answer: Option<&'a str>,
    pub(crate) student_answer: &'a str,
    pub(crate) max_marks: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Evaluation {
    /// Raw score as returned by the evaluator; callers clamp it.
    pub(crate) score: f64,
    pub(crate) feedback: String,
    pub(crate) model: String,
}

#[async_trait]
pub(crate) trait AnswerEvaluator: Send + Sync {
    async fn evaluate(&self, request: &EvaluationRequest<'_>) -> Result<Evaluation, ServiceError>;
}

#[async_trait]
pub(crate) trait RubricGenerator: Send + Sync {
    async fn generate_rubric(
        &self,
        question_text: &str,
        expected_answer: Option<&str>,
        marks: f64,
    ) -> Result<Value, ServiceError>;
}

/// OpenAI-compatible chat completions client used for scoring and rubrics.
#[derive(Debug, Clone)]
pub(crate) struct OpenAiEvaluator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiEvaluator {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(Duration::from_secs(settings.ai().ai_request_timeout))
            .build()
            .context("Failed to build AI HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
        })
    }

    async fn complete_json(&self, system: &str, user: String) -> Result<Value, ServiceError> {
        if self.api_key.is_empty() {
            return Err(ServiceError::Disabled("AI evaluation"));
        }

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "max_completion_tokens": self.max_tokens,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let body: Value = ensure_success(response).await?.json().await?;

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceError::Malformed("missing completion content".to_string()))?;

        extract_json_object(content)
            .ok_or_else(|| ServiceError::Malformed("completion is not a JSON object".to_string()))
    }
}

#[async_trait]
impl AnswerEvaluator for OpenAiEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest<'_>) -> Result<Evaluation, ServiceError> {
        let user_prompt = format!(
            "Maximum score: {}\n\nQuestion:\n{}\n\nExpected answer:\n{}\n\nStudent answer:\n{}\n",
            request.max_marks,
            request.question_text,
            request.expected_answer.unwrap_or("N/A"),
            request.student_answer,
        );

        let value = self.complete_json(EVALUATION_SYSTEM_PROMPT, user_prompt).await?;
        let (score, feedback) = parse_evaluation(&value)?;
        Ok(Evaluation { score, feedback, model: self.model.clone() })
    }
}

#[async_trait]
impl RubricGenerator for OpenAiEvaluator {
    async fn generate_rubric(
        &self,
        question_text: &str,
        expected_answer: Option<&str>,
        marks: f64,
    ) -> Result<Value, ServiceError> {
        let user_prompt = format!(
            "Total marks: {marks}\n\nQuestion:\n{question_text}\n\nExpected answer:\n{}\n",
            expected_answer.unwrap_or("N/A"),
        );

        let value = self.complete_json(RUBRIC_SYSTEM_PROMPT, user_prompt).await?;
        if !value.get("criteria").is_some_and(Value::is_array) {
            return Err(ServiceError::Malformed("rubric without criteria".to_string()));
        }
        Ok(value)
    }
}

/// Pulls a JSON object out of a model reply: fenced block first, then the outermost braces.
pub(crate) fn extract_json_object(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let body_start = after_fence.find('\n').map_or(0, |idx| idx + 1);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn parse_evaluation(value: &Value) -> Result<(f64, String), ServiceError> {
    let score = value
        .get("score")
        .and_then(Value::as_f64)
        .ok_or_else(|| ServiceError::Malformed("score is not a number".to_string()))?;
    let feedback = value.get("feedback").and_then(Value::as_str).unwrap_or_default().to_string();
    Ok((score, feedback))
}
