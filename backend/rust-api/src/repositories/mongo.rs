use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};

use super::{
    AnswerRepository, AssessmentRepository, AttemptAnswerRepository, AttemptRepository,
    QuestionRepository, RepoResult,
};
use crate::error::EngineError;
use crate::models::attempt::{
    Attempt, AttemptAnswer, AttemptStatus, AttemptTransition, ReviewVerdict,
};
use crate::models::question::{Answer, Question};
use crate::models::Assessment;

const ASSESSMENTS: &str = "assessments";
const QUESTIONS: &str = "questions";
const ANSWERS: &str = "answers";
const ATTEMPTS: &str = "attempts";
const ATTEMPT_ANSWERS: &str = "attempt_answers";

fn bson_dt(date: &DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(date.timestamp_millis())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
        *err.kind
    {
        return we.code == 11000;
    }
    false
}

/// Creates the indexes the engine's atomicity guarantees rely on:
/// - at most one IN_PROGRESS attempt per (identity_id, assessment_id),
/// - exactly one attempt answer per (attempt_id, question_id).
pub async fn ensure_indexes(db: &Database) -> anyhow::Result<()> {
    let attempts: Collection<Attempt> = db.collection(ATTEMPTS);
    attempts
        .create_index(
            IndexModel::builder()
                .keys(doc! { "identity_id": 1, "assessment_id": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "status": "IN_PROGRESS" })
                        .build(),
                )
                .build(),
        )
        .await
        .context("Failed to create active-attempt unique index")?;

    let attempt_answers: Collection<AttemptAnswer> = db.collection(ATTEMPT_ANSWERS);
    attempt_answers
        .create_index(
            IndexModel::builder()
                .keys(doc! { "attempt_id": 1, "question_id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build(),
        )
        .await
        .context("Failed to create attempt-answer unique index")?;

    tracing::info!("MongoDB indexes ensured");
    Ok(())
}

pub struct MongoAssessmentRepository {
    collection: Collection<Assessment>,
}

impl MongoAssessmentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(ASSESSMENTS),
        }
    }
}

#[async_trait]
impl AssessmentRepository for MongoAssessmentRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Assessment>> {
        let found = self
            .collection
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query assessments")?;
        Ok(found)
    }

    async fn create(&self, assessment: &Assessment) -> RepoResult<()> {
        self.collection
            .insert_one(assessment)
            .await
            .context("Failed to insert assessment")?;
        Ok(())
    }
}

pub struct MongoQuestionRepository {
    collection: Collection<Question>,
}

impl MongoQuestionRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(QUESTIONS),
        }
    }
}

#[async_trait]
impl QuestionRepository for MongoQuestionRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Question>> {
        let found = self
            .collection
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query questions")?;
        Ok(found)
    }

    async fn find_by_assessment_id(&self, assessment_id: &str) -> RepoResult<Vec<Question>> {
        let questions = self
            .collection
            .find(doc! { "assessment_id": assessment_id })
            .sort(doc! { "createdAt": 1 })
            .await
            .context("Failed to query questions by assessment")?
            .try_collect()
            .await
            .context("Failed to read question cursor")?;
        Ok(questions)
    }

    async fn create(&self, question: &Question) -> RepoResult<()> {
        self.collection
            .insert_one(question)
            .await
            .context("Failed to insert question")?;
        Ok(())
    }
}

pub struct MongoAnswerRepository {
    collection: Collection<Answer>,
}

impl MongoAnswerRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(ANSWERS),
        }
    }
}

#[async_trait]
impl AnswerRepository for MongoAnswerRepository {
    async fn find_by_question_id(&self, question_id: &str) -> RepoResult<Option<Answer>> {
        let found = self
            .collection
            .find_one(doc! { "question_id": question_id })
            .await
            .context("Failed to query answer key")?;
        Ok(found)
    }

    async fn find_many_by_question_ids(&self, question_ids: &[String]) -> RepoResult<Vec<Answer>> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }
        let answers = self
            .collection
            .find(doc! { "question_id": { "$in": question_ids } })
            .await
            .context("Failed to query answer keys")?
            .try_collect()
            .await
            .context("Failed to read answer-key cursor")?;
        Ok(answers)
    }

    async fn create(&self, answer: &Answer) -> RepoResult<()> {
        self.collection
            .insert_one(answer)
            .await
            .context("Failed to insert answer key")?;
        Ok(())
    }
}

pub struct MongoAttemptRepository {
    collection: Collection<Attempt>,
}

impl MongoAttemptRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(ATTEMPTS),
        }
    }

    fn transition_update(transition: &AttemptTransition) -> Document {
        match transition {
            AttemptTransition::Submit { submitted_at } => doc! {
                "$set": {
                    "status": AttemptStatus::Submitted.as_str(),
                    "submittedAt": bson_dt(submitted_at),
                    "updatedAt": bson_dt(submitted_at),
                }
            },
            AttemptTransition::StartGrading { at } => doc! {
                "$set": {
                    "status": AttemptStatus::Grading.as_str(),
                    "updatedAt": bson_dt(at),
                }
            },
            AttemptTransition::Grade {
                score,
                passed,
                graded_at,
            } => doc! {
                "$set": {
                    "status": AttemptStatus::Graded.as_str(),
                    "score": i32::from(*score),
                    "passed": passed,
                    "gradedAt": bson_dt(graded_at),
                    "updatedAt": bson_dt(graded_at),
                }
            },
        }
    }
}

#[async_trait]
impl AttemptRepository for MongoAttemptRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Attempt>> {
        let found = self
            .collection
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query attempts")?;
        Ok(found)
    }

    async fn find_active_by_identity_and_assessment(
        &self,
        identity_id: &str,
        assessment_id: &str,
    ) -> RepoResult<Option<Attempt>> {
        let found = self
            .collection
            .find_one(doc! {
                "identity_id": identity_id,
                "assessment_id": assessment_id,
                "status": AttemptStatus::InProgress.as_str(),
            })
            .await
            .context("Failed to query active attempt")?;
        Ok(found)
    }

    async fn create(&self, attempt: &Attempt) -> RepoResult<()> {
        match self.collection.insert_one(attempt).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                // The partial unique index fired: another IN_PROGRESS attempt
                // for this pair won the race. Surface it with the resume id.
                let active = self
                    .find_active_by_identity_and_assessment(
                        &attempt.identity_id,
                        &attempt.assessment_id,
                    )
                    .await?;
                Err(EngineError::DuplicateActiveAttempt {
                    identity_id: attempt.identity_id.clone(),
                    assessment_id: attempt.assessment_id.clone(),
                    active_attempt_id: active.map(|a| a.id).unwrap_or_default(),
                })
            }
            Err(e) => Err(EngineError::Dependency(
                anyhow::Error::new(e).context("Failed to insert attempt"),
            )),
        }
    }

    async fn update_status_if(
        &self,
        id: &str,
        expected: &[AttemptStatus],
        transition: &AttemptTransition,
    ) -> RepoResult<Option<Attempt>> {
        let expected: Vec<&str> = expected.iter().map(AttemptStatus::as_str).collect();
        let updated = self
            .collection
            .find_one_and_update(
                doc! { "_id": id, "status": { "$in": expected } },
                Self::transition_update(transition),
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to transition attempt status")?;
        Ok(updated)
    }
}

pub struct MongoAttemptAnswerRepository {
    collection: Collection<AttemptAnswer>,
}

impl MongoAttemptAnswerRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(ATTEMPT_ANSWERS),
        }
    }
}

#[async_trait]
impl AttemptAnswerRepository for MongoAttemptAnswerRepository {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<AttemptAnswer>> {
        let found = self
            .collection
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query attempt answers")?;
        Ok(found)
    }

    async fn upsert(&self, answer: &AttemptAnswer) -> RepoResult<AttemptAnswer> {
        // Revision may switch the payload variant, so the superseded field
        // has to be unset alongside the new one being set.
        let (set_payload, unset_field) = match &answer.payload {
            crate::models::attempt::AnswerPayload::Selection { selected_option_id } => (
                doc! { "kind": "SELECTION", "selected_option_id": selected_option_id },
                "text_answer",
            ),
            crate::models::attempt::AnswerPayload::Text { text_answer } => (
                doc! { "kind": "TEXT", "text_answer": text_answer },
                "selected_option_id",
            ),
        };

        let mut set = set_payload;
        set.insert("status", answer.status.as_str());
        set.insert("updatedAt", bson_dt(&answer.updated_at));

        let update = doc! {
            "$set": set,
            "$unset": { unset_field: "" },
            "$setOnInsert": {
                "_id": &answer.id,
                "createdAt": bson_dt(&answer.created_at),
            },
        };

        let stored = self
            .collection
            .find_one_and_update(
                doc! {
                    "attempt_id": &answer.attempt_id,
                    "question_id": &answer.question_id,
                },
                update,
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to upsert attempt answer")?
            .ok_or_else(|| {
                EngineError::Dependency(anyhow::anyhow!(
                    "upsert returned no document for attempt {} question {}",
                    answer.attempt_id,
                    answer.question_id
                ))
            })?;
        Ok(stored)
    }

    async fn find_by_attempt_id(&self, attempt_id: &str) -> RepoResult<Vec<AttemptAnswer>> {
        let answers = self
            .collection
            .find(doc! { "attempt_id": attempt_id })
            .sort(doc! { "createdAt": 1 })
            .await
            .context("Failed to query attempt answers")?
            .try_collect()
            .await
            .context("Failed to read attempt-answer cursor")?;
        Ok(answers)
    }

    async fn count_ungraded(&self, attempt_id: &str) -> RepoResult<u64> {
        let count = self
            .collection
            .count_documents(doc! {
                "attempt_id": attempt_id,
                "status": { "$ne": "GRADED" },
            })
            .await
            .context("Failed to count ungraded answers")?;
        Ok(count)
    }

    async fn find_pending_review(
        &self,
        attempt_id: Option<&str>,
        limit: i64,
    ) -> RepoResult<Vec<AttemptAnswer>> {
        // Free-text answers are exactly the open-question ones; the ledger's
        // shape validation guarantees that.
        let mut filter = doc! { "kind": "TEXT", "status": "SUBMITTED" };
        if let Some(attempt_id) = attempt_id {
            filter.insert("attempt_id", attempt_id);
        }

        let answers = self
            .collection
            .find(filter)
            .sort(doc! { "createdAt": 1 })
            .limit(limit)
            .await
            .context("Failed to query pending reviews")?
            .try_collect()
            .await
            .context("Failed to read pending-review cursor")?;
        Ok(answers)
    }

    async fn grade_if_submitted(
        &self,
        id: &str,
        verdict: &ReviewVerdict,
    ) -> RepoResult<Option<AttemptAnswer>> {
        let now = Utc::now();
        let mut set = doc! {
            "status": "GRADED",
            "is_correct": verdict.is_correct,
            "updatedAt": bson_dt(&now),
        };
        if let Some(reviewer_id) = &verdict.reviewer_id {
            set.insert("reviewer_id", reviewer_id);
        }
        if let Some(comment) = &verdict.teacher_comment {
            set.insert("teacher_comment", comment);
        }

        let graded = self
            .collection
            .find_one_and_update(doc! { "_id": id, "status": "SUBMITTED" }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to grade attempt answer")?;
        Ok(graded)
    }
}
