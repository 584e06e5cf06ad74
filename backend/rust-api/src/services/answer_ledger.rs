//! AttemptAnswerLedger: validated writes over one attempt's answers.
//!
//! Enforces the one-answer-per-question invariant (via the repository's
//! upsert) and validates every submission against the question bank before
//! anything is stored.

use chrono::Utc;

use crate::error::EngineError;
use crate::models::attempt::{AnswerPayload, Attempt, AttemptAnswer, SubmitAnswerRequest};
use crate::models::question::QuestionType;
use crate::repositories::{AttemptAnswerRepository as _, QuestionRepository as _};
use crate::services::Repositories;

pub struct AnswerLedger {
    repos: Repositories,
}

impl AnswerLedger {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Validates and stores one answer for an IN_PROGRESS attempt.
    /// Resubmission for the same question replaces the previous answer.
    pub async fn upsert(
        &self,
        attempt: &Attempt,
        req: &SubmitAnswerRequest,
    ) -> Result<AttemptAnswer, EngineError> {
        let question = self
            .repos
            .questions
            .find_by_id(&req.question_id)
            .await?
            .ok_or_else(|| EngineError::not_found("question", &req.question_id))?;

        if question.assessment_id != attempt.assessment_id {
            return Err(EngineError::QuestionNotInAssessment {
                question_id: question.id,
                assessment_id: attempt.assessment_id.clone(),
            });
        }

        let payload = req.payload()?;
        match (&payload, question.question_type) {
            (AnswerPayload::Selection { selected_option_id }, QuestionType::MultipleChoice) => {
                if !question.has_option(selected_option_id) {
                    return Err(EngineError::invalid_input(
                        "selected_option_id",
                        format!(
                            "option {selected_option_id} does not belong to question {}",
                            question.id
                        ),
                    ));
                }
            }
            (AnswerPayload::Text { .. }, QuestionType::Open) => {}
            (AnswerPayload::Text { .. }, QuestionType::MultipleChoice) => {
                return Err(EngineError::invalid_input(
                    "text_answer",
                    "multiple-choice questions take selected_option_id",
                ));
            }
            (AnswerPayload::Selection { .. }, QuestionType::Open) => {
                return Err(EngineError::invalid_input(
                    "selected_option_id",
                    "open questions take text_answer",
                ));
            }
        }

        let answer = AttemptAnswer::submitted(
            attempt.id.clone(),
            question.id.clone(),
            payload,
            Utc::now(),
        );
        let stored = self.repos.attempt_answers.upsert(&answer).await?;

        tracing::debug!(
            attempt_id = %attempt.id,
            question_id = %question.id,
            "Answer recorded in ledger"
        );
        Ok(stored)
    }

    pub async fn get(
        &self,
        attempt_id: &str,
        question_id: &str,
    ) -> Result<Option<AttemptAnswer>, EngineError> {
        let answers = self.repos.attempt_answers.find_by_attempt_id(attempt_id).await?;
        Ok(answers.into_iter().find(|a| a.question_id == question_id))
    }

    pub async fn list_by_attempt(
        &self,
        attempt_id: &str,
    ) -> Result<Vec<AttemptAnswer>, EngineError> {
        self.repos.attempt_answers.find_by_attempt_id(attempt_id).await
    }

    pub async fn count_ungraded(&self, attempt_id: &str) -> Result<u64, EngineError> {
        self.repos.attempt_answers.count_ungraded(attempt_id).await
    }
}
