use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{bson_datetime_as_chrono, Assessment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    MultipleChoice,
    Open,
}

/// Question model stored in the MongoDB "questions" collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub assessment_id: String,
    /// Optional grouping; carried through, no behavior in this engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_id: Option<String>,
    /// Present for MULTIPLE_CHOICE questions, empty for OPEN ones.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

impl Question {
    pub fn is_multiple_choice(&self) -> bool {
        self.question_type == QuestionType::MultipleChoice
    }

    pub fn belongs_to(&self, assessment: &Assessment) -> bool {
        self.assessment_id == assessment.id
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }
}

/// Authoritative answer record for one question, stored in the "answers"
/// collection. MULTIPLE_CHOICE questions carry `correct_option_id`; OPEN
/// questions carry only the explanation used as grading guidance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "_id")]
    pub id: String,
    pub question_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_option_id: Option<String>,
    pub explanation: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

/// Question as rendered to the attempting student: options without the
/// correct-answer key.
#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Vec<QuestionOption>,
}

impl From<Question> for QuestionView {
    fn from(question: Question) -> Self {
        QuestionView {
            id: question.id,
            text: question.text,
            question_type: question.question_type,
            options: question.options,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListQuestionsResponse {
    pub assessment_id: String,
    pub questions: Vec<QuestionView>,
}
