use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::EngineError;
use crate::extractors::AppJson;
use crate::models::attempt::{PendingReviewQuery, ReviewAnswerRequest};
use crate::services::{review_service::ReviewService, AppState};

fn review_service(state: &AppState) -> ReviewService {
    ReviewService::new(state.repos.clone(), state.config.grading.clone())
}

pub async fn list_pending_reviews(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingReviewQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let pending = review_service(&state).list_pending(&query).await?;
    let count = pending.len();
    Ok(Json(json!({
        "pending": pending,
        "count": count,
    })))
}

pub async fn review_answer(
    State(state): State<Arc<AppState>>,
    Path(attempt_answer_id): Path<String>,
    AppJson(req): AppJson<ReviewAnswerRequest>,
) -> Result<impl IntoResponse, EngineError> {
    req.validate()
        .map_err(|e| EngineError::invalid_input("request", e.to_string()))?;

    let response = review_service(&state)
        .review_answer(&attempt_answer_id, &req)
        .await?;
    Ok(Json(response))
}
