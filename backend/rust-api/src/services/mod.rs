pub mod answer_ledger;
pub mod attempt_service;
pub mod review_service;
pub mod scoring;

use std::sync::Arc;

use anyhow::Context;
use mongodb::{Client, Database};

use crate::config::Config;
use crate::repositories::memory::{
    InMemoryAnswerRepository, InMemoryAssessmentRepository, InMemoryAttemptAnswerRepository,
    InMemoryAttemptRepository, InMemoryQuestionRepository,
};
use crate::repositories::mongo::{
    ensure_indexes, MongoAnswerRepository, MongoAssessmentRepository,
    MongoAttemptAnswerRepository, MongoAttemptRepository, MongoQuestionRepository,
};
use crate::repositories::{
    AnswerRepository, AssessmentRepository, AttemptAnswerRepository, AttemptRepository,
    QuestionRepository,
};

/// The five repositories behind the engine, as trait objects so the same
/// services run against MongoDB in production and the in-memory store in
/// tests.
#[derive(Clone)]
pub struct Repositories {
    pub assessments: Arc<dyn AssessmentRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub attempt_answers: Arc<dyn AttemptAnswerRepository>,
}

pub struct AppState {
    pub config: Config,
    pub repos: Repositories,
    pub mongo: Option<Database>,
}

impl AppState {
    pub async fn new(config: Config, client: Client) -> anyhow::Result<Self> {
        let db = client.database(&config.mongo_database);
        ensure_indexes(&db)
            .await
            .context("Failed to create MongoDB indexes")?;

        let repos = Repositories {
            assessments: Arc::new(MongoAssessmentRepository::new(&db)),
            questions: Arc::new(MongoQuestionRepository::new(&db)),
            answers: Arc::new(MongoAnswerRepository::new(&db)),
            attempts: Arc::new(MongoAttemptRepository::new(&db)),
            attempt_answers: Arc::new(MongoAttemptAnswerRepository::new(&db)),
        };

        Ok(Self {
            config,
            repos,
            mongo: Some(db),
        })
    }

    /// State backed by the in-memory repositories; no database required.
    pub fn in_memory(config: Config) -> Self {
        let repos = Repositories {
            assessments: Arc::new(InMemoryAssessmentRepository::default()),
            questions: Arc::new(InMemoryQuestionRepository::default()),
            answers: Arc::new(InMemoryAnswerRepository::default()),
            attempts: Arc::new(InMemoryAttemptRepository::default()),
            attempt_answers: Arc::new(InMemoryAttemptAnswerRepository::default()),
        };

        Self {
            config,
            repos,
            mongo: None,
        }
    }
}
