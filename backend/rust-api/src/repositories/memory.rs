//! In-memory repository implementations.
//!
//! Used by the integration tests via [`crate::services::AppState::in_memory`].
//! Each repository guards its map with a single mutex so the
//! check-then-insert and compare-and-set contracts hold under concurrency
//! exactly as the MongoDB indexes and conditional updates do.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    AnswerRepository, AssessmentRepository, AttemptAnswerRepository, AttemptRepository,
    QuestionRepository, RepoResult,
};
use crate::error::EngineError;
use crate::models::attempt::{
    AnswerPayload, Attempt, AttemptAnswer, AttemptAnswerStatus, AttemptStatus, AttemptTransition,
    ReviewVerdict,
};
use crate::models::question::{Answer, Question};
use crate::models::Assessment;

#[derive(Default)]
pub struct InMemoryAssessmentRepository {
    items: Mutex<HashMap<String, Assessment>>,
}

#[async_trait]
impl AssessmentRepository for InMemoryAssessmentRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Assessment>> {
        Ok(self.items.lock().unwrap().get(id).cloned())
    }

    async fn create(&self, assessment: &Assessment) -> RepoResult<()> {
        self.items
            .lock()
            .unwrap()
            .insert(assessment.id.clone(), assessment.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryQuestionRepository {
    items: Mutex<Vec<Question>>,
}

#[async_trait]
impl QuestionRepository for InMemoryQuestionRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Question>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.id == id)
            .cloned())
    }

    async fn find_by_assessment_id(&self, assessment_id: &str) -> RepoResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.assessment_id == assessment_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(questions)
    }

    async fn create(&self, question: &Question) -> RepoResult<()> {
        self.items.lock().unwrap().push(question.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAnswerRepository {
    items: Mutex<Vec<Answer>>,
}

#[async_trait]
impl AnswerRepository for InMemoryAnswerRepository {
    async fn find_by_question_id(&self, question_id: &str) -> RepoResult<Option<Answer>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.question_id == question_id)
            .cloned())
    }

    async fn find_many_by_question_ids(&self, question_ids: &[String]) -> RepoResult<Vec<Answer>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|a| question_ids.contains(&a.question_id))
            .cloned()
            .collect())
    }

    async fn create(&self, answer: &Answer) -> RepoResult<()> {
        self.items.lock().unwrap().push(answer.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAttemptRepository {
    items: Mutex<HashMap<String, Attempt>>,
}

#[async_trait]
impl AttemptRepository for InMemoryAttemptRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Attempt>> {
        Ok(self.items.lock().unwrap().get(id).cloned())
    }

    async fn find_active_by_identity_and_assessment(
        &self,
        identity_id: &str,
        assessment_id: &str,
    ) -> RepoResult<Option<Attempt>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .values()
            .find(|a| {
                a.identity_id == identity_id
                    && a.assessment_id == assessment_id
                    && a.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn create(&self, attempt: &Attempt) -> RepoResult<()> {
        // One lock covers the duplicate check and the insert, mirroring the
        // partial unique index on the MongoDB side.
        let mut items = self.items.lock().unwrap();
        if let Some(active) = items.values().find(|a| {
            a.identity_id == attempt.identity_id
                && a.assessment_id == attempt.assessment_id
                && a.status == AttemptStatus::InProgress
        }) {
            return Err(EngineError::DuplicateActiveAttempt {
                identity_id: attempt.identity_id.clone(),
                assessment_id: attempt.assessment_id.clone(),
                active_attempt_id: active.id.clone(),
            });
        }
        items.insert(attempt.id.clone(), attempt.clone());
        Ok(())
    }

    async fn update_status_if(
        &self,
        id: &str,
        expected: &[AttemptStatus],
        transition: &AttemptTransition,
    ) -> RepoResult<Option<Attempt>> {
        let mut items = self.items.lock().unwrap();
        match items.get_mut(id) {
            Some(attempt) if expected.contains(&attempt.status) => {
                attempt.apply_transition(transition);
                Ok(Some(attempt.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct InMemoryAttemptAnswerRepository {
    items: Mutex<Vec<AttemptAnswer>>,
}

#[async_trait]
impl AttemptAnswerRepository for InMemoryAttemptAnswerRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<AttemptAnswer>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn upsert(&self, answer: &AttemptAnswer) -> RepoResult<AttemptAnswer> {
        let mut items = self.items.lock().unwrap();
        if let Some(existing) = items
            .iter_mut()
            .find(|a| a.attempt_id == answer.attempt_id && a.question_id == answer.question_id)
        {
            // Last writer wins; id and created_at survive the revision.
            existing.payload = answer.payload.clone();
            existing.status = answer.status;
            existing.updated_at = answer.updated_at;
            return Ok(existing.clone());
        }
        items.push(answer.clone());
        Ok(answer.clone())
    }

    async fn find_by_attempt_id(&self, attempt_id: &str) -> RepoResult<Vec<AttemptAnswer>> {
        let mut answers: Vec<AttemptAnswer> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect();
        answers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(answers)
    }

    async fn count_ungraded(&self, attempt_id: &str) -> RepoResult<u64> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.attempt_id == attempt_id && a.status != AttemptAnswerStatus::Graded)
            .count() as u64)
    }

    async fn find_pending_review(
        &self,
        attempt_id: Option<&str>,
        limit: i64,
    ) -> RepoResult<Vec<AttemptAnswer>> {
        let mut pending: Vec<AttemptAnswer> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                a.status == AttemptAnswerStatus::Submitted
                    && matches!(a.payload, AnswerPayload::Text { .. })
                    && attempt_id.is_none_or(|id| a.attempt_id == id)
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn grade_if_submitted(
        &self,
        id: &str,
        verdict: &ReviewVerdict,
    ) -> RepoResult<Option<AttemptAnswer>> {
        let mut items = self.items.lock().unwrap();
        match items.iter_mut().find(|a| a.id == id) {
            Some(answer) if answer.status == AttemptAnswerStatus::Submitted => {
                answer.apply_verdict(verdict, Utc::now());
                Ok(Some(answer.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(identity: &str, assessment: &str) -> Attempt {
        Attempt::start(identity.into(), assessment.into(), None, Utc::now())
    }

    #[tokio::test]
    async fn second_active_attempt_is_rejected_with_resume_id() {
        let repo = InMemoryAttemptRepository::default();
        let first = attempt("student-1", "quiz-1");
        repo.create(&first).await.unwrap();

        let err = repo
            .create(&attempt("student-1", "quiz-1"))
            .await
            .unwrap_err();
        match err {
            EngineError::DuplicateActiveAttempt {
                active_attempt_id, ..
            } => assert_eq!(active_attempt_id, first.id),
            other => panic!("expected DuplicateActiveAttempt, got {other:?}"),
        }

        // A different assessment is fine.
        repo.create(&attempt("student-1", "quiz-2")).await.unwrap();
    }

    #[tokio::test]
    async fn conditional_transition_is_exactly_once() {
        let repo = InMemoryAttemptRepository::default();
        let a = attempt("student-1", "quiz-1");
        repo.create(&a).await.unwrap();

        let transition = AttemptTransition::Submit {
            submitted_at: Utc::now(),
        };
        let first = repo
            .update_status_if(&a.id, &[AttemptStatus::InProgress], &transition)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = repo
            .update_status_if(&a.id, &[AttemptStatus::InProgress], &transition)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_instead_of_duplicating() {
        let repo = InMemoryAttemptAnswerRepository::default();
        let first = AttemptAnswer::submitted(
            "attempt-1".into(),
            "q1".into(),
            AnswerPayload::Selection {
                selected_option_id: "o1".into(),
            },
            Utc::now(),
        );
        repo.upsert(&first).await.unwrap();

        let revised = AttemptAnswer::submitted(
            "attempt-1".into(),
            "q1".into(),
            AnswerPayload::Selection {
                selected_option_id: "o2".into(),
            },
            Utc::now(),
        );
        let stored = repo.upsert(&revised).await.unwrap();

        assert_eq!(stored.id, first.id);
        assert_eq!(stored.payload.selected_option_id(), Some("o2"));
        assert_eq!(
            repo.find_by_attempt_id("attempt-1").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn grading_an_already_graded_answer_is_a_no_op() {
        let repo = InMemoryAttemptAnswerRepository::default();
        let answer = AttemptAnswer::submitted(
            "attempt-1".into(),
            "q1".into(),
            AnswerPayload::Text {
                text_answer: "essay".into(),
            },
            Utc::now(),
        );
        repo.upsert(&answer).await.unwrap();

        let verdict = ReviewVerdict {
            is_correct: true,
            reviewer_id: Some("tutor-1".into()),
            teacher_comment: None,
        };
        assert!(repo
            .grade_if_submitted(&answer.id, &verdict)
            .await
            .unwrap()
            .is_some());
        assert!(repo
            .grade_if_submitted(&answer.id, &verdict)
            .await
            .unwrap()
            .is_none());
    }
}
