//! ReviewWorkflow: the manual-grading queue for open answers.
//!
//! Reviewers pull SUBMITTED text answers oldest-first, record a verdict,
//! and the workflow finalizes the attempt when the last ungraded answer is
//! cleared. The verdict write is conditional on the answer still being
//! SUBMITTED, so two reviewers racing on the same answer produce exactly
//! one grade.

use crate::config::GradingConfig;
use crate::error::EngineError;
use crate::metrics::REVIEWS_COMPLETED_TOTAL;
use crate::models::attempt::{
    AttemptAnswerResponse, AttemptStatus, PendingReviewQuery, ReviewAnswerRequest,
    ReviewAnswerResponse, ReviewVerdict,
};
use crate::repositories::{
    AttemptAnswerRepository as _, AttemptRepository as _, QuestionRepository as _,
};
use crate::services::attempt_service::AttemptService;
use crate::services::Repositories;

const DEFAULT_PENDING_LIMIT: i64 = 50;
const MAX_PENDING_LIMIT: i64 = 200;

pub struct ReviewService {
    repos: Repositories,
    grading: GradingConfig,
}

impl ReviewService {
    pub fn new(repos: Repositories, grading: GradingConfig) -> Self {
        Self { repos, grading }
    }

    /// Open answers awaiting review, oldest submission first.
    pub async fn list_pending(
        &self,
        query: &PendingReviewQuery,
    ) -> Result<Vec<AttemptAnswerResponse>, EngineError> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PENDING_LIMIT)
            .clamp(1, MAX_PENDING_LIMIT);

        let pending = self
            .repos
            .attempt_answers
            .find_pending_review(query.attempt_id.as_deref(), limit)
            .await?;

        Ok(pending.into_iter().map(Into::into).collect())
    }

    /// Records a reviewer's verdict on one open answer.
    ///
    /// When this was the attempt's last ungraded answer, the attempt is
    /// finalized in the same call; the response carries the resulting
    /// attempt status so the reviewer sees whether their verdict closed it.
    pub async fn review_answer(
        &self,
        attempt_answer_id: &str,
        req: &ReviewAnswerRequest,
    ) -> Result<ReviewAnswerResponse, EngineError> {
        let answer = self
            .repos
            .attempt_answers
            .find_by_id(attempt_answer_id)
            .await?
            .ok_or_else(|| EngineError::not_found("attempt answer", attempt_answer_id))?;

        if answer.is_graded() {
            return Err(EngineError::AlreadyReviewed {
                attempt_answer_id: attempt_answer_id.to_string(),
            });
        }

        let attempt = self
            .repos
            .attempts
            .find_by_id(&answer.attempt_id)
            .await?
            .ok_or_else(|| EngineError::not_found("attempt", &answer.attempt_id))?;

        if !matches!(
            attempt.status,
            AttemptStatus::Submitted | AttemptStatus::Grading
        ) {
            return Err(EngineError::invalid_state(
                "review_answer",
                attempt.status.as_str(),
                "attempt is not awaiting review",
            ));
        }

        let question = self
            .repos
            .questions
            .find_by_id(&answer.question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("question", &answer.question_id))?;

        if question.is_multiple_choice() {
            return Err(EngineError::invalid_state(
                "review_answer",
                attempt.status.as_str(),
                "only open questions are manually reviewed",
            ));
        }

        let verdict = ReviewVerdict {
            is_correct: req.is_correct,
            reviewer_id: Some(req.reviewer_id.clone()),
            teacher_comment: req.teacher_comment.clone(),
        };

        let graded = self
            .repos
            .attempt_answers
            .grade_if_submitted(attempt_answer_id, &verdict)
            .await?
            .ok_or_else(|| EngineError::AlreadyReviewed {
                attempt_answer_id: attempt_answer_id.to_string(),
            })?;

        let verdict_label = if req.is_correct { "correct" } else { "incorrect" };
        REVIEWS_COMPLETED_TOTAL
            .with_label_values(&[verdict_label])
            .inc();
        tracing::info!(
            attempt_answer_id = %attempt_answer_id,
            attempt_id = %attempt.id,
            reviewer_id = %req.reviewer_id,
            is_correct = req.is_correct,
            "Open answer reviewed"
        );

        let remaining = self
            .repos
            .attempt_answers
            .count_ungraded(&attempt.id)
            .await?;

        let attempt_status = if remaining == 0 {
            let service = AttemptService::new(self.repos.clone(), self.grading.clone());
            service.finalize(&attempt.id).await?.status
        } else {
            attempt.status
        };

        Ok(ReviewAnswerResponse {
            answer: graded.into(),
            attempt_status,
        })
    }
}
