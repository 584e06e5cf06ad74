use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::EngineError;
use crate::extractors::AppJson;
use crate::models::attempt::{AttemptResponse, StartAttemptRequest, SubmitAnswerRequest};
use crate::services::{attempt_service::AttemptService, AppState};

fn attempt_service(state: &AppState) -> AttemptService {
    AttemptService::new(state.repos.clone(), state.config.grading.clone())
}

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<StartAttemptRequest>,
) -> Result<impl IntoResponse, EngineError> {
    req.validate()
        .map_err(|e| EngineError::invalid_input("request", e.to_string()))?;

    let attempt = attempt_service(&state).start(&req).await?;
    Ok((StatusCode::CREATED, Json(AttemptResponse::from(attempt))))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, EngineError> {
    req.validate()
        .map_err(|e| EngineError::invalid_input("request", e.to_string()))?;

    let answer = attempt_service(&state)
        .submit_answer(&attempt_id, &req)
        .await?;
    Ok(Json(crate::models::attempt::AttemptAnswerResponse::from(
        answer,
    )))
}

pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let response = attempt_service(&state).submit_attempt(&attempt_id).await?;
    Ok(Json(response))
}

pub async fn get_attempt_results(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let response = attempt_service(&state)
        .get_attempt_result(&attempt_id)
        .await?;
    Ok(Json(response))
}

pub async fn list_attempt_questions(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, EngineError> {
    let response = attempt_service(&state).list_questions(&attempt_id).await?;
    Ok(Json(response))
}
