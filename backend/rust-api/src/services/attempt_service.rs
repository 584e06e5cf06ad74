//! AttemptStateMachine: owns the lifecycle of one attempt.
//!
//! IN_PROGRESS -> SUBMITTED -> GRADING -> GRADED, with the fast path
//! SUBMITTED -> GRADED when nothing awaits manual review. Every transition
//! is a compare-and-set at the repository, so concurrent triggers (two
//! reviewers, a timeout scheduler racing a client submit) settle to exactly
//! one winner without in-process locks.

use std::collections::HashMap;

use chrono::Utc;
use rand::seq::SliceRandom;

use crate::config::GradingConfig;
use crate::error::EngineError;
use crate::metrics::{
    ANSWERS_SUBMITTED_TOTAL, ATTEMPTS_GRADED_TOTAL, ATTEMPTS_STARTED_TOTAL,
    ATTEMPTS_SUBMITTED_TOTAL,
};
use crate::models::attempt::{
    AnswerPayload, Attempt, AttemptAnswer, AttemptResultsResponse, AttemptStatus, AttemptSummary,
    AttemptTransition, ReviewVerdict, StartAttemptRequest, SubmitAnswerRequest,
    SubmitAttemptResponse,
};
use crate::models::question::{Answer, ListQuestionsResponse, Question, QuestionView};
use crate::repositories::{
    AnswerRepository as _, AssessmentRepository as _, AttemptAnswerRepository as _,
    AttemptRepository as _, QuestionRepository as _,
};
use crate::services::answer_ledger::AnswerLedger;
use crate::services::{scoring, Repositories};

pub struct AttemptService {
    repos: Repositories,
    grading: GradingConfig,
}

impl AttemptService {
    pub fn new(repos: Repositories, grading: GradingConfig) -> Self {
        Self { repos, grading }
    }

    fn ledger(&self) -> AnswerLedger {
        AnswerLedger::new(self.repos.clone())
    }

    /// Starts a new attempt. At most one IN_PROGRESS attempt may exist per
    /// (identity, assessment) pair; the conflict carries the active attempt
    /// id so clients can resume it.
    pub async fn start(&self, req: &StartAttemptRequest) -> Result<Attempt, EngineError> {
        let assessment = self
            .repos
            .assessments
            .find_by_id(&req.assessment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("assessment", &req.assessment_id))?;

        if let Some(active) = self
            .repos
            .attempts
            .find_active_by_identity_and_assessment(&req.identity_id, &req.assessment_id)
            .await?
        {
            return Err(EngineError::DuplicateActiveAttempt {
                identity_id: req.identity_id.clone(),
                assessment_id: req.assessment_id.clone(),
                active_attempt_id: active.id,
            });
        }

        let attempt = Attempt::start(
            req.identity_id.clone(),
            assessment.id.clone(),
            assessment.time_limit(),
            Utc::now(),
        );

        // The pre-check above gives a precise error on the common path; the
        // unique constraint behind `create` closes the race window.
        self.repos.attempts.create(&attempt).await?;

        ATTEMPTS_STARTED_TOTAL.inc();
        tracing::info!(
            attempt_id = %attempt.id,
            identity_id = %attempt.identity_id,
            assessment_id = %attempt.assessment_id,
            "Attempt started"
        );
        Ok(attempt)
    }

    /// Records one answer for an IN_PROGRESS attempt; resubmission for the
    /// same question is a revision, not a duplicate.
    pub async fn submit_answer(
        &self,
        attempt_id: &str,
        req: &SubmitAnswerRequest,
    ) -> Result<AttemptAnswer, EngineError> {
        let attempt = self.find_attempt(attempt_id).await?;

        if !attempt.is_in_progress() {
            return Err(EngineError::invalid_state(
                "submit_answer",
                attempt.status.as_str(),
                "attempt is no longer accepting answers",
            ));
        }
        if attempt.is_expired(Utc::now()) {
            return Err(EngineError::invalid_state(
                "submit_answer",
                attempt.status.as_str(),
                "time limit has expired",
            ));
        }

        let stored = self.ledger().upsert(&attempt, req).await?;

        let type_label = match &stored.payload {
            AnswerPayload::Selection { .. } => "multiple_choice",
            AnswerPayload::Text { .. } => "open",
        };
        ANSWERS_SUBMITTED_TOTAL.with_label_values(&[type_label]).inc();

        Ok(stored)
    }

    /// Closes an attempt: transitions to SUBMITTED, auto-grades every
    /// multiple-choice answer, then either finalizes directly or parks the
    /// attempt in GRADING until reviewers clear the open answers.
    ///
    /// This is also the timeout entry point: an external scheduler calls it
    /// when a timed attempt's window elapses, so an expired attempt is
    /// accepted here and unanswered questions fall under the configured
    /// unanswered policy.
    pub async fn submit_attempt(
        &self,
        attempt_id: &str,
    ) -> Result<SubmitAttemptResponse, EngineError> {
        let attempt = self.find_attempt(attempt_id).await?;
        let now = Utc::now();

        let submitted = self
            .repos
            .attempts
            .update_status_if(
                attempt_id,
                &[AttemptStatus::InProgress],
                &AttemptTransition::Submit { submitted_at: now },
            )
            .await?
            .ok_or_else(|| {
                EngineError::invalid_state(
                    "submit_attempt",
                    attempt.status.as_str(),
                    "only an in-progress attempt can be submitted",
                )
            })?;

        let questions = self
            .repos
            .questions
            .find_by_assessment_id(&submitted.assessment_id)
            .await?;
        let answers = self
            .repos
            .attempt_answers
            .find_by_attempt_id(attempt_id)
            .await?;

        self.auto_grade(&questions, &answers).await?;

        let ungraded = self.repos.attempt_answers.count_ungraded(attempt_id).await?;
        let total_questions = questions.len() as u32;
        let answered_questions = answers.len() as u32;

        if ungraded > 0 {
            let grading = match self
                .repos
                .attempts
                .update_status_if(
                    attempt_id,
                    &[AttemptStatus::Submitted],
                    &AttemptTransition::StartGrading { at: Utc::now() },
                )
                .await?
            {
                Some(attempt) => attempt,
                // A reviewer cleared the queue inside our window; pick up
                // whatever state won.
                None => self.find_attempt(attempt_id).await?,
            };

            ATTEMPTS_SUBMITTED_TOTAL
                .with_label_values(&["pending_review"])
                .inc();
            tracing::info!(
                attempt_id = %attempt_id,
                pending = ungraded,
                "Attempt submitted, awaiting manual review"
            );

            return Ok(SubmitAttemptResponse {
                attempt: grading.into(),
                summary: AttemptSummary {
                    total_questions,
                    answered_questions,
                    graded_answers: answered_questions.saturating_sub(ungraded as u32),
                    pending_review: ungraded,
                },
            });
        }

        let graded = self.finalize(attempt_id).await?;
        ATTEMPTS_SUBMITTED_TOTAL.with_label_values(&["graded"]).inc();

        Ok(SubmitAttemptResponse {
            attempt: graded.into(),
            summary: AttemptSummary {
                total_questions,
                answered_questions,
                graded_answers: answered_questions,
                pending_review: 0,
            },
        })
    }

    /// Computes the final score and transitions to GRADED, exactly once.
    ///
    /// Idempotent: a GRADED attempt is returned unchanged. The score is
    /// computed before any write, so a failed persistence write leaves the
    /// attempt in its prior state and the call can safely be re-invoked.
    pub async fn finalize(&self, attempt_id: &str) -> Result<Attempt, EngineError> {
        let attempt = self.find_attempt(attempt_id).await?;

        if attempt.is_graded() {
            return Ok(attempt);
        }
        if attempt.is_in_progress() {
            return Err(EngineError::invalid_state(
                "finalize",
                attempt.status.as_str(),
                "attempt has not been submitted",
            ));
        }

        let ungraded = self.repos.attempt_answers.count_ungraded(attempt_id).await?;
        if ungraded > 0 {
            return Err(EngineError::invalid_state(
                "finalize",
                attempt.status.as_str(),
                format!("{ungraded} answers still await grading"),
            ));
        }

        let assessment = self
            .repos
            .assessments
            .find_by_id(&attempt.assessment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("assessment", &attempt.assessment_id))?;
        let questions = self
            .repos
            .questions
            .find_by_assessment_id(&attempt.assessment_id)
            .await?;
        let answers = self
            .repos
            .attempt_answers
            .find_by_attempt_id(attempt_id)
            .await?;

        let report = scoring::score_attempt(
            &questions,
            &answers,
            assessment.passing_score,
            self.grading.unanswered_policy,
        );

        match self
            .repos
            .attempts
            .update_status_if(
                attempt_id,
                &[AttemptStatus::Submitted, AttemptStatus::Grading],
                &AttemptTransition::Grade {
                    score: report.score,
                    passed: report.passed,
                    graded_at: Utc::now(),
                },
            )
            .await?
        {
            Some(graded) => {
                let passed_label = if report.passed { "true" } else { "false" };
                ATTEMPTS_GRADED_TOTAL.with_label_values(&[passed_label]).inc();
                tracing::info!(
                    attempt_id = %attempt_id,
                    score = report.score,
                    passed = report.passed,
                    "Attempt finalized"
                );
                Ok(graded)
            }
            None => {
                // Concurrent finalize triggers: the compare-and-set admits
                // one winner. Losing is a no-op, not an error.
                let current = self.find_attempt(attempt_id).await?;
                if current.is_graded() {
                    Ok(current)
                } else {
                    Err(EngineError::invalid_state(
                        "finalize",
                        current.status.as_str(),
                        "attempt changed state concurrently",
                    ))
                }
            }
        }
    }

    /// Full picture of one attempt: the attempt, its answers, and counts.
    pub async fn get_attempt_result(
        &self,
        attempt_id: &str,
    ) -> Result<AttemptResultsResponse, EngineError> {
        let attempt = self.find_attempt(attempt_id).await?;
        let questions = self
            .repos
            .questions
            .find_by_assessment_id(&attempt.assessment_id)
            .await?;
        let answers = self
            .repos
            .attempt_answers
            .find_by_attempt_id(attempt_id)
            .await?;

        let graded_answers = answers.iter().filter(|a| a.is_graded()).count() as u32;
        let pending_review = answers.iter().filter(|a| !a.is_graded()).count() as u64;

        Ok(AttemptResultsResponse {
            summary: AttemptSummary {
                total_questions: questions.len() as u32,
                answered_questions: answers.len() as u32,
                graded_answers,
                pending_review,
            },
            answers: answers.into_iter().map(Into::into).collect(),
            attempt: attempt.into(),
        })
    }

    /// Questions for rendering the attempt, without answer keys. Order of
    /// questions and of multiple-choice options is shuffled when the
    /// assessment's randomize flags are set.
    pub async fn list_questions(
        &self,
        attempt_id: &str,
    ) -> Result<ListQuestionsResponse, EngineError> {
        let attempt = self.find_attempt(attempt_id).await?;
        let assessment = self
            .repos
            .assessments
            .find_by_id(&attempt.assessment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("assessment", &attempt.assessment_id))?;

        let mut questions = self
            .repos
            .questions
            .find_by_assessment_id(&assessment.id)
            .await?;

        let mut rng = rand::rng();
        if assessment.randomize_questions {
            questions.shuffle(&mut rng);
        }
        if assessment.randomize_options {
            for question in &mut questions {
                question.options.shuffle(&mut rng);
            }
        }

        Ok(ListQuestionsResponse {
            assessment_id: assessment.id,
            questions: questions.into_iter().map(QuestionView::from).collect(),
        })
    }

    async fn find_attempt(&self, attempt_id: &str) -> Result<Attempt, EngineError> {
        self.repos
            .attempts
            .find_by_id(attempt_id)
            .await?
            .ok_or_else(|| EngineError::not_found("attempt", attempt_id))
    }

    /// Deterministically grades every multiple-choice answer that is still
    /// ungraded. Open answers stay SUBMITTED for the review workflow.
    async fn auto_grade(
        &self,
        questions: &[Question],
        answers: &[AttemptAnswer],
    ) -> Result<(), EngineError> {
        let mc_question_ids: Vec<String> = questions
            .iter()
            .filter(|q| q.is_multiple_choice())
            .map(|q| q.id.clone())
            .collect();
        let keys: HashMap<String, Answer> = self
            .repos
            .answers
            .find_many_by_question_ids(&mc_question_ids)
            .await?
            .into_iter()
            .map(|key| (key.question_id.clone(), key))
            .collect();

        for answer in answers {
            let Some(question) = questions.iter().find(|q| q.id == answer.question_id) else {
                continue;
            };
            if !question.is_multiple_choice() || answer.is_graded() {
                continue;
            }

            // A question without an answer key grades as incorrect rather
            // than blocking the whole attempt in GRADING.
            let is_correct = keys
                .get(&question.id)
                .map(|key| scoring::grade_selection(&answer.payload, key))
                .unwrap_or(false);

            self.repos
                .attempt_answers
                .grade_if_submitted(&answer.id, &ReviewVerdict::auto(is_correct))
                .await?;
        }
        Ok(())
    }
}
