#![allow(dead_code)]

use std::sync::Arc;

use assessment_api::{
    config::{Config, GradingConfig},
    create_router,
    models::{
        attempt::Attempt,
        question::{Answer, Question, QuestionOption, QuestionType},
        Assessment, AssessmentType,
    },
    repositories::{
        AnswerRepository as _, AssessmentRepository as _, AttemptRepository as _,
        QuestionRepository as _,
    },
    services::AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://localhost:27017".to_string(),
        mongo_database: "assessment_test".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        grading: GradingConfig::default(),
    }
}

/// App over the in-memory repositories; no database required.
pub fn create_test_app() -> TestApp {
    let state = Arc::new(AppState::in_memory(test_config()));
    let router = create_router(state.clone());
    TestApp { router, state }
}

pub async fn seed_assessment(
    state: &AppState,
    id: &str,
    assessment_type: AssessmentType,
    passing_score: u8,
    time_limit_in_minutes: Option<u32>,
) {
    let now = Utc::now();
    state
        .repos
        .assessments
        .create(&Assessment {
            id: id.to_string(),
            title: format!("Assessment {id}"),
            assessment_type,
            passing_score,
            time_limit_in_minutes,
            randomize_questions: false,
            randomize_options: false,
            lesson_id: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

/// Multiple-choice question with options `{id}-a` .. `{id}-c`; the answer
/// key marks `{id}-a` as correct.
pub async fn seed_mc_question(state: &AppState, assessment_id: &str, question_id: &str) {
    let now = Utc::now();
    state
        .repos
        .questions
        .create(&Question {
            id: question_id.to_string(),
            text: format!("Question {question_id}"),
            question_type: QuestionType::MultipleChoice,
            assessment_id: assessment_id.to_string(),
            argument_id: None,
            options: ["a", "b", "c"]
                .iter()
                .map(|suffix| QuestionOption {
                    id: format!("{question_id}-{suffix}"),
                    text: format!("Option {suffix}"),
                })
                .collect(),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    state
        .repos
        .answers
        .create(&Answer {
            id: format!("key-{question_id}"),
            question_id: question_id.to_string(),
            correct_option_id: Some(format!("{question_id}-a")),
            explanation: "The first option is correct".to_string(),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

pub async fn seed_open_question(state: &AppState, assessment_id: &str, question_id: &str) {
    let now = Utc::now();
    state
        .repos
        .questions
        .create(&Question {
            id: question_id.to_string(),
            text: format!("Essay question {question_id}"),
            question_type: QuestionType::Open,
            assessment_id: assessment_id.to_string(),
            argument_id: None,
            options: vec![],
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    state
        .repos
        .answers
        .create(&Answer {
            id: format!("key-{question_id}"),
            question_id: question_id.to_string(),
            correct_option_id: None,
            explanation: "Grading guidance for the reviewer".to_string(),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

/// Inserts an attempt whose timed window already elapsed.
pub async fn seed_expired_attempt(
    state: &AppState,
    identity_id: &str,
    assessment_id: &str,
) -> Attempt {
    let started = Utc::now() - chrono::Duration::minutes(120);
    let attempt = Attempt::start(
        identity_id.to_string(),
        assessment_id.to_string(),
        Some(chrono::Duration::minutes(90)),
        started,
    );
    state.repos.attempts.create(&attempt).await.unwrap();
    attempt
}

pub async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Starts an attempt through the API and returns its id.
pub async fn start_attempt(router: &Router, identity_id: &str, assessment_id: &str) -> String {
    let (status, body) = post_json(
        router,
        "/api/v1/attempts",
        serde_json::json!({
            "identity_id": identity_id,
            "assessment_id": assessment_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "start failed: {body}");
    body["id"].as_str().unwrap().to_string()
}

pub async fn submit_selection(
    router: &Router,
    attempt_id: &str,
    question_id: &str,
    option_id: &str,
) -> (StatusCode, Value) {
    post_json(
        router,
        &format!("/api/v1/attempts/{attempt_id}/answers"),
        serde_json::json!({
            "question_id": question_id,
            "selected_option_id": option_id,
        }),
    )
    .await
}

pub async fn submit_text(
    router: &Router,
    attempt_id: &str,
    question_id: &str,
    text: &str,
) -> (StatusCode, Value) {
    post_json(
        router,
        &format!("/api/v1/attempts/{attempt_id}/answers"),
        serde_json::json!({
            "question_id": question_id,
            "text_answer": text,
        }),
    )
    .await
}
