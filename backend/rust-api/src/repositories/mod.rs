use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::attempt::{
    Attempt, AttemptAnswer, AttemptStatus, AttemptTransition, ReviewVerdict,
};
use crate::models::question::{Answer, Question};
use crate::models::Assessment;

pub mod memory;
pub mod mongo;

pub type RepoResult<T> = Result<T, EngineError>;

/// Read model over assessments. Creation exists for seeding and admin
/// tooling; the engine itself never mutates assessments.
#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Assessment>>;
    async fn create(&self, assessment: &Assessment) -> RepoResult<()>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Question>>;
    async fn find_by_assessment_id(&self, assessment_id: &str) -> RepoResult<Vec<Question>>;
    async fn create(&self, question: &Question) -> RepoResult<()>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    async fn find_by_question_id(&self, question_id: &str) -> RepoResult<Option<Answer>>;
    async fn find_many_by_question_ids(&self, question_ids: &[String]) -> RepoResult<Vec<Answer>>;
    async fn create(&self, answer: &Answer) -> RepoResult<()>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Attempt>>;

    async fn find_active_by_identity_and_assessment(
        &self,
        identity_id: &str,
        assessment_id: &str,
    ) -> RepoResult<Option<Attempt>>;

    /// Creates an IN_PROGRESS attempt. The duplicate-check-then-insert must
    /// be atomic: two concurrent creates for the same (identity, assessment)
    /// pair yield exactly one success and one
    /// [`EngineError::DuplicateActiveAttempt`].
    async fn create(&self, attempt: &Attempt) -> RepoResult<()>;

    /// Atomic conditional transition: applies `transition` only if the
    /// current status is one of `expected`, returning the updated attempt.
    /// `Ok(None)` means the compare-and-set did not match; the caller decides
    /// whether that is a lost race or an illegal transition.
    async fn update_status_if(
        &self,
        id: &str,
        expected: &[AttemptStatus],
        transition: &AttemptTransition,
    ) -> RepoResult<Option<Attempt>>;
}

#[async_trait]
pub trait AttemptAnswerRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<AttemptAnswer>>;

    /// Inserts or replaces the answer for (attempt_id, question_id),
    /// last-writer-wins. The stored document keeps its original id and
    /// created_at across revisions.
    async fn upsert(&self, answer: &AttemptAnswer) -> RepoResult<AttemptAnswer>;

    /// All answers of one attempt, oldest first.
    async fn find_by_attempt_id(&self, attempt_id: &str) -> RepoResult<Vec<AttemptAnswer>>;

    /// Answers not yet GRADED; the state machine's predicate for choosing
    /// between GRADING and finalize.
    async fn count_ungraded(&self, attempt_id: &str) -> RepoResult<u64>;

    /// SUBMITTED free-text answers awaiting human review, oldest first,
    /// optionally scoped to one attempt.
    async fn find_pending_review(
        &self,
        attempt_id: Option<&str>,
        limit: i64,
    ) -> RepoResult<Vec<AttemptAnswer>>;

    /// Atomic grading write: applies the verdict only if the answer is still
    /// SUBMITTED. `Ok(None)` means it was already graded (lost review race or
    /// re-review, both surfaced as Conflict by the caller).
    async fn grade_if_submitted(
        &self,
        id: &str,
        verdict: &ReviewVerdict,
    ) -> RepoResult<Option<AttemptAnswer>>;
}
