use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};
use crate::error::EngineError;

/// Attempt lifecycle: IN_PROGRESS -> SUBMITTED -> GRADING -> GRADED, with a
/// fast path SUBMITTED -> GRADED when no open questions await review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Grading,
    Graded,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "IN_PROGRESS",
            AttemptStatus::Submitted => "SUBMITTED",
            AttemptStatus::Grading => "GRADING",
            AttemptStatus::Graded => "GRADED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Graded)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempt model stored in the MongoDB "attempts" collection.
///
/// Mutated only through [`crate::repositories::AttemptRepository`]'s
/// conditional transition, never by plain read-then-write updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub identity_id: String,
    pub assessment_id: String,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(rename = "startedAt", with = "bson_datetime_as_chrono")]
    pub started_at: DateTime<Utc>,
    #[serde(
        rename = "submittedAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "gradedAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub graded_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "timeLimitExpiresAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub time_limit_expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    pub fn start(
        identity_id: String,
        assessment_id: String,
        time_limit: Option<chrono::Duration>,
        now: DateTime<Utc>,
    ) -> Self {
        Attempt {
            id: Uuid::new_v4().to_string(),
            identity_id,
            assessment_id,
            status: AttemptStatus::InProgress,
            score: None,
            passed: None,
            started_at: now,
            submitted_at: None,
            graded_at: None,
            time_limit_expires_at: time_limit.map(|limit| now + limit),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    pub fn is_graded(&self) -> bool {
        self.status == AttemptStatus::Graded
    }

    /// Whether a timed attempt's window has elapsed. Untimed attempts never
    /// expire; expired attempts are closed by the external scheduler calling
    /// `submit_attempt`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.time_limit_expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Applies a transition's field updates. Status preconditions are
    /// enforced by the repository's conditional write, not here.
    pub fn apply_transition(&mut self, transition: &AttemptTransition) {
        match transition {
            AttemptTransition::Submit { submitted_at } => {
                self.status = AttemptStatus::Submitted;
                self.submitted_at = Some(*submitted_at);
                self.updated_at = *submitted_at;
            }
            AttemptTransition::StartGrading { at } => {
                self.status = AttemptStatus::Grading;
                self.updated_at = *at;
            }
            AttemptTransition::Grade {
                score,
                passed,
                graded_at,
            } => {
                self.status = AttemptStatus::Graded;
                self.score = Some(*score);
                self.passed = Some(*passed);
                self.graded_at = Some(*graded_at);
                self.updated_at = *graded_at;
            }
        }
    }
}

/// The three writes the state machine performs on an attempt. Each one is
/// executed as a compare-and-set on the current status.
#[derive(Debug, Clone)]
pub enum AttemptTransition {
    Submit { submitted_at: DateTime<Utc> },
    StartGrading { at: DateTime<Utc> },
    Grade {
        score: u8,
        passed: bool,
        graded_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptAnswerStatus {
    Submitted,
    Graded,
}

impl AttemptAnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptAnswerStatus::Submitted => "SUBMITTED",
            AttemptAnswerStatus::Graded => "GRADED",
        }
    }
}

/// Exactly one of a selected option or a free-text answer; the tagged enum
/// makes "both" and "neither" unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerPayload {
    Selection { selected_option_id: String },
    Text { text_answer: String },
}

impl AnswerPayload {
    pub fn selected_option_id(&self) -> Option<&str> {
        match self {
            AnswerPayload::Selection { selected_option_id } => Some(selected_option_id),
            AnswerPayload::Text { .. } => None,
        }
    }

    pub fn text_answer(&self) -> Option<&str> {
        match self {
            AnswerPayload::Text { text_answer } => Some(text_answer),
            AnswerPayload::Selection { .. } => None,
        }
    }
}

/// AttemptAnswer model stored in the MongoDB "attempt_answers" collection.
/// One document per (attempt_id, question_id), enforced by a unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptAnswer {
    #[serde(rename = "_id")]
    pub id: String,
    pub attempt_id: String,
    pub question_id: String,
    #[serde(flatten)]
    pub payload: AnswerPayload,
    pub status: AttemptAnswerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_comment: Option<String>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl AttemptAnswer {
    pub fn submitted(
        attempt_id: String,
        question_id: String,
        payload: AnswerPayload,
        now: DateTime<Utc>,
    ) -> Self {
        AttemptAnswer {
            id: Uuid::new_v4().to_string(),
            attempt_id,
            question_id,
            payload,
            status: AttemptAnswerStatus::Submitted,
            is_correct: None,
            reviewer_id: None,
            teacher_comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_graded(&self) -> bool {
        self.status == AttemptAnswerStatus::Graded
    }

    pub fn apply_verdict(&mut self, verdict: &ReviewVerdict, now: DateTime<Utc>) {
        self.status = AttemptAnswerStatus::Graded;
        self.is_correct = Some(verdict.is_correct);
        self.reviewer_id = verdict.reviewer_id.clone();
        self.teacher_comment = verdict.teacher_comment.clone();
        self.updated_at = now;
    }
}

/// Correctness determination for one attempt answer: produced by auto-grading
/// (no reviewer) or by a human review.
#[derive(Debug, Clone)]
pub struct ReviewVerdict {
    pub is_correct: bool,
    pub reviewer_id: Option<String>,
    pub teacher_comment: Option<String>,
}

impl ReviewVerdict {
    pub fn auto(is_correct: bool) -> Self {
        ReviewVerdict {
            is_correct,
            reviewer_id: None,
            teacher_comment: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct StartAttemptRequest {
    #[validate(length(min = 1, message = "identity_id must not be empty"))]
    pub identity_id: String,
    #[validate(length(min = 1, message = "assessment_id must not be empty"))]
    pub assessment_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub question_id: String,
    pub selected_option_id: Option<String>,
    pub text_answer: Option<String>,
}

impl SubmitAnswerRequest {
    /// Collapses the two optional wire fields into the tagged payload,
    /// rejecting "both set" and "neither set".
    pub fn payload(&self) -> Result<AnswerPayload, EngineError> {
        match (&self.selected_option_id, &self.text_answer) {
            (Some(option_id), None) => Ok(AnswerPayload::Selection {
                selected_option_id: option_id.clone(),
            }),
            (None, Some(text)) => {
                if text.trim().is_empty() {
                    return Err(EngineError::invalid_input(
                        "text_answer",
                        "must not be blank",
                    ));
                }
                Ok(AnswerPayload::Text {
                    text_answer: text.clone(),
                })
            }
            (Some(_), Some(_)) => Err(EngineError::invalid_input(
                "selected_option_id",
                "provide either selected_option_id or text_answer, not both",
            )),
            (None, None) => Err(EngineError::invalid_input(
                "selected_option_id",
                "either selected_option_id or text_answer is required",
            )),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewAnswerRequest {
    #[validate(length(min = 1, message = "reviewer_id must not be empty"))]
    pub reviewer_id: String,
    pub is_correct: bool,
    #[validate(length(max = 2000, message = "teacher_comment is too long"))]
    pub teacher_comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingReviewQuery {
    pub attempt_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub id: String,
    pub identity_id: String,
    pub assessment_id: String,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_expires_at: Option<DateTime<Utc>>,
}

impl From<Attempt> for AttemptResponse {
    fn from(attempt: Attempt) -> Self {
        AttemptResponse {
            id: attempt.id,
            identity_id: attempt.identity_id,
            assessment_id: attempt.assessment_id,
            status: attempt.status,
            score: attempt.score,
            passed: attempt.passed,
            started_at: attempt.started_at,
            submitted_at: attempt.submitted_at,
            graded_at: attempt.graded_at,
            time_limit_expires_at: attempt.time_limit_expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttemptAnswerResponse {
    pub id: String,
    pub attempt_id: String,
    pub question_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_option_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_answer: Option<String>,
    pub status: AttemptAnswerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AttemptAnswer> for AttemptAnswerResponse {
    fn from(answer: AttemptAnswer) -> Self {
        AttemptAnswerResponse {
            id: answer.id,
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            selected_option_id: answer.payload.selected_option_id().map(str::to_owned),
            text_answer: answer.payload.text_answer().map(str::to_owned),
            status: answer.status,
            is_correct: answer.is_correct,
            reviewer_id: answer.reviewer_id,
            teacher_comment: answer.teacher_comment,
            created_at: answer.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttemptSummary {
    pub total_questions: u32,
    pub answered_questions: u32,
    pub graded_answers: u32,
    pub pending_review: u64,
}

#[derive(Debug, Serialize)]
pub struct SubmitAttemptResponse {
    pub attempt: AttemptResponse,
    pub summary: AttemptSummary,
}

#[derive(Debug, Serialize)]
pub struct AttemptResultsResponse {
    pub attempt: AttemptResponse,
    pub answers: Vec<AttemptAnswerResponse>,
    pub summary: AttemptSummary,
}

#[derive(Debug, Serialize)]
pub struct ReviewAnswerResponse {
    pub answer: AttemptAnswerResponse,
    /// Status of the owning attempt after the review; GRADED once the last
    /// open answer is reviewed.
    pub attempt_status: AttemptStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt() -> Attempt {
        Attempt::start("student-1".into(), "quiz-1".into(), None, Utc::now())
    }

    #[test]
    fn start_creates_in_progress_attempt() {
        let attempt = attempt();
        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert!(attempt.submitted_at.is_none());
        assert!(attempt.time_limit_expires_at.is_none());
    }

    #[test]
    fn timed_attempt_expires_after_its_window() {
        let now = Utc::now();
        let attempt = Attempt::start(
            "student-1".into(),
            "simulado-1".into(),
            Some(chrono::Duration::minutes(90)),
            now,
        );
        assert!(!attempt.is_expired(now + chrono::Duration::minutes(89)));
        assert!(attempt.is_expired(now + chrono::Duration::minutes(91)));
    }

    #[test]
    fn grade_transition_sets_terminal_fields() {
        let mut attempt = attempt();
        let submitted_at = Utc::now();
        attempt.apply_transition(&AttemptTransition::Submit { submitted_at });
        assert_eq!(attempt.status, AttemptStatus::Submitted);
        assert_eq!(attempt.submitted_at, Some(submitted_at));

        let graded_at = Utc::now();
        attempt.apply_transition(&AttemptTransition::Grade {
            score: 75,
            passed: true,
            graded_at,
        });
        assert!(attempt.status.is_terminal());
        assert_eq!(attempt.score, Some(75));
        assert_eq!(attempt.passed, Some(true));
        assert_eq!(attempt.graded_at, Some(graded_at));
    }

    #[test]
    fn payload_requires_exactly_one_field() {
        let both = SubmitAnswerRequest {
            question_id: "q1".into(),
            selected_option_id: Some("o1".into()),
            text_answer: Some("essay".into()),
        };
        assert!(both.payload().is_err());

        let neither = SubmitAnswerRequest {
            question_id: "q1".into(),
            selected_option_id: None,
            text_answer: None,
        };
        assert!(neither.payload().is_err());

        let selection = SubmitAnswerRequest {
            question_id: "q1".into(),
            selected_option_id: Some("o1".into()),
            text_answer: None,
        };
        assert_eq!(
            selection.payload().unwrap(),
            AnswerPayload::Selection {
                selected_option_id: "o1".into()
            }
        );
    }
}
