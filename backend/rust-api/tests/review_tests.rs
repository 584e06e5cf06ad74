use assessment_api::models::AssessmentType;
use assessment_api::repositories::AttemptAnswerRepository as _;
use axum::http::StatusCode;
use serde_json::json;

mod common;

/// Seeds a quiz with two multiple-choice questions and one open question,
/// answers all three (both selections correct), and submits. Returns the
/// attempt id; the attempt is left in GRADING.
async fn submitted_mixed_attempt(app: &common::TestApp, identity_id: &str) -> String {
    let attempt_id = common::start_attempt(&app.router, identity_id, "mixed-1").await;

    common::submit_selection(&app.router, &attempt_id, "q1", "q1-a").await;
    common::submit_selection(&app.router, &attempt_id, "q2", "q2-a").await;
    common::submit_text(&app.router, &attempt_id, "q3", "An essay answer").await;

    let (status, body) = common::post_json(
        &app.router,
        &format!("/api/v1/attempts/{attempt_id}/submit"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "submit failed: {body}");
    assert_eq!(body["attempt"]["status"], "GRADING");
    assert_eq!(body["summary"]["pending_review"], 1);
    assert!(body["attempt"]["score"].is_null());

    attempt_id
}

async fn seed_mixed_assessment(app: &common::TestApp) {
    common::seed_assessment(&app.state, "mixed-1", AssessmentType::ProvaAberta, 70, None).await;
    common::seed_mc_question(&app.state, "mixed-1", "q1").await;
    common::seed_mc_question(&app.state, "mixed-1", "q2").await;
    common::seed_open_question(&app.state, "mixed-1", "q3").await;
}

#[tokio::test]
async fn open_answers_park_the_attempt_in_grading() {
    let app = common::create_test_app();
    seed_mixed_assessment(&app).await;

    let attempt_id = submitted_mixed_attempt(&app, "student-1").await;

    let (status, body) = common::get_json(
        &app.router,
        &format!("/api/v1/attempts/{attempt_id}/results"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attempt"]["status"], "GRADING");
    assert!(body["attempt"]["score"].is_null());
    assert_eq!(body["summary"]["graded_answers"], 2);
    assert_eq!(body["summary"]["pending_review"], 1);
}

#[tokio::test]
async fn reviewing_the_last_open_answer_finalizes_the_attempt() {
    let app = common::create_test_app();
    seed_mixed_assessment(&app).await;

    let attempt_id = submitted_mixed_attempt(&app, "student-1").await;

    let (status, body) = common::get_json(&app.router, "/api/v1/reviews/pending").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let answer_id = body["pending"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = common::post_json(
        &app.router,
        &format!("/api/v1/reviews/{answer_id}"),
        json!({
            "reviewer_id": "tutor-1",
            "is_correct": true,
            "teacher_comment": "Well argued",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "review failed: {body}");
    assert_eq!(body["answer"]["is_correct"], true);
    assert_eq!(body["answer"]["reviewer_id"], "tutor-1");
    assert_eq!(body["attempt_status"], "GRADED");

    // 3/3 correct.
    let (_, results) = common::get_json(
        &app.router,
        &format!("/api/v1/attempts/{attempt_id}/results"),
    )
    .await;
    assert_eq!(results["attempt"]["score"], 100);
    assert_eq!(results["attempt"]["passed"], true);
}

#[tokio::test]
async fn incorrect_verdict_lowers_the_score() {
    let app = common::create_test_app();
    seed_mixed_assessment(&app).await;

    let attempt_id = submitted_mixed_attempt(&app, "student-1").await;

    let (_, pending) = common::get_json(&app.router, "/api/v1/reviews/pending").await;
    let answer_id = pending["pending"][0]["id"].as_str().unwrap();

    let (status, body) = common::post_json(
        &app.router,
        &format!("/api/v1/reviews/{answer_id}"),
        json!({ "reviewer_id": "tutor-1", "is_correct": false }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attempt_status"], "GRADED");

    // 2 of 3 correct rounds to 67, below the passing score of 70.
    let (_, results) = common::get_json(
        &app.router,
        &format!("/api/v1/attempts/{attempt_id}/results"),
    )
    .await;
    assert_eq!(results["attempt"]["score"], 67);
    assert_eq!(results["attempt"]["passed"], false);
}

#[tokio::test]
async fn reviewing_the_same_answer_twice_conflicts() {
    let app = common::create_test_app();
    seed_mixed_assessment(&app).await;

    submitted_mixed_attempt(&app, "student-1").await;

    let (_, pending) = common::get_json(&app.router, "/api/v1/reviews/pending").await;
    let answer_id = pending["pending"][0]["id"].as_str().unwrap().to_string();

    let verdict = json!({ "reviewer_id": "tutor-1", "is_correct": true });
    let uri = format!("/api/v1/reviews/{answer_id}");

    let (status, _) = common::post_json(&app.router, &uri, verdict.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = common::post_json(&app.router, &uri, verdict).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "CONFLICT");
}

#[tokio::test]
async fn reviewing_an_unknown_answer_is_not_found() {
    let app = common::create_test_app();

    let (status, body) = common::post_json(
        &app.router,
        "/api/v1/reviews/no-such-answer",
        json!({ "reviewer_id": "tutor-1", "is_correct": true }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NOT_FOUND");
}

#[tokio::test]
async fn answers_of_in_progress_attempts_cannot_be_reviewed() {
    let app = common::create_test_app();
    seed_mixed_assessment(&app).await;

    let attempt_id = common::start_attempt(&app.router, "student-1", "mixed-1").await;
    common::submit_text(&app.router, &attempt_id, "q3", "Draft essay").await;

    let answers = app
        .state
        .repos
        .attempt_answers
        .find_by_attempt_id(&attempt_id)
        .await
        .unwrap();

    let (status, body) = common::post_json(
        &app.router,
        &format!("/api/v1/reviews/{}", answers[0].id),
        json!({ "reviewer_id": "tutor-1", "is_correct": true }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "INVALID_STATE");
}

#[tokio::test]
async fn multiple_choice_answers_are_not_manually_reviewable() {
    use assessment_api::models::attempt::{AnswerPayload, AttemptAnswer};

    let app = common::create_test_app();
    seed_mixed_assessment(&app).await;

    let attempt_id = submitted_mixed_attempt(&app, "student-1").await;

    // Force a SUBMITTED selection answer back into the GRADING attempt.
    let revived = AttemptAnswer::submitted(
        attempt_id.clone(),
        "q1".to_string(),
        AnswerPayload::Selection {
            selected_option_id: "q1-b".to_string(),
        },
        chrono::Utc::now(),
    );
    let stored = app
        .state
        .repos
        .attempt_answers
        .upsert(&revived)
        .await
        .unwrap();

    let (status, body) = common::post_json(
        &app.router,
        &format!("/api/v1/reviews/{}", stored.id),
        json!({ "reviewer_id": "tutor-1", "is_correct": true }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "INVALID_STATE");
}

#[tokio::test]
async fn pending_reviews_are_served_oldest_first() {
    let app = common::create_test_app();
    seed_mixed_assessment(&app).await;

    let first_attempt = submitted_mixed_attempt(&app, "student-1").await;
    let second_attempt = submitted_mixed_attempt(&app, "student-2").await;

    let (status, body) = common::get_json(&app.router, "/api/v1/reviews/pending").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["pending"][0]["attempt_id"], first_attempt);
    assert_eq!(body["pending"][1]["attempt_id"], second_attempt);

    // Scoped to one attempt.
    let (_, scoped) = common::get_json(
        &app.router,
        &format!("/api/v1/reviews/pending?attempt_id={second_attempt}"),
    )
    .await;
    assert_eq!(scoped["count"], 1);
    assert_eq!(scoped["pending"][0]["attempt_id"], second_attempt);

    // Limit caps the page.
    let (_, limited) = common::get_json(&app.router, "/api/v1/reviews/pending?limit=1").await;
    assert_eq!(limited["count"], 1);
    assert_eq!(limited["pending"][0]["attempt_id"], first_attempt);
}
