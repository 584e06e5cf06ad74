//! ScoringPolicy: pure computation, no I/O.
//!
//! Turns a set of graded attempt answers into a numeric score and a
//! pass/fail verdict against the assessment's passing threshold.

use serde::{Deserialize, Serialize};

use crate::models::attempt::{AnswerPayload, AttemptAnswer};
use crate::models::question::{Answer, Question};

/// What to do with questions that have no answer at submission time.
///
/// The default counts them as incorrect so a student cannot improve the
/// score by skipping questions; `ExcludeFromTotal` drops them from the
/// denominator instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnansweredPolicy {
    #[default]
    CountAsIncorrect,
    ExcludeFromTotal,
}

impl std::str::FromStr for UnansweredPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count_as_incorrect" => Ok(UnansweredPolicy::CountAsIncorrect),
            "exclude_from_total" => Ok(UnansweredPolicy::ExcludeFromTotal),
            other => Err(format!("unknown unanswered policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreReport {
    pub correct_count: u32,
    pub total_gradable: u32,
    /// round(100 * correct_count / total_gradable), 0 when nothing gradable.
    pub score: u8,
    /// `score >= passing_score`; the boundary is a pass.
    pub passed: bool,
}

/// Deterministic auto-grading for a MULTIPLE_CHOICE response.
pub fn grade_selection(payload: &AnswerPayload, key: &Answer) -> bool {
    match (payload.selected_option_id(), &key.correct_option_id) {
        (Some(selected), Some(correct)) => selected == correct,
        _ => false,
    }
}

/// Scores one attempt from its (already graded) answers.
///
/// Walks the assessment's questions, not the answers, so unanswered
/// questions are visible to the policy. An answer without a correctness
/// determination is treated like a missing one; at finalization time every
/// stored answer is GRADED, so that branch only matters for partial
/// previews.
pub fn score_attempt(
    questions: &[Question],
    answers: &[AttemptAnswer],
    passing_score: u8,
    unanswered: UnansweredPolicy,
) -> ScoreReport {
    let mut correct_count: u32 = 0;
    let mut total_gradable: u32 = 0;

    for question in questions {
        let determination = answers
            .iter()
            .find(|a| a.question_id == question.id)
            .and_then(|a| a.is_correct);

        match determination {
            Some(is_correct) => {
                total_gradable += 1;
                if is_correct {
                    correct_count += 1;
                }
            }
            None => {
                if unanswered == UnansweredPolicy::CountAsIncorrect {
                    total_gradable += 1;
                }
            }
        }
    }

    let score = if total_gradable == 0 {
        0
    } else {
        (100.0 * f64::from(correct_count) / f64::from(total_gradable)).round() as u8
    };

    ScoreReport {
        correct_count,
        total_gradable,
        score,
        passed: score >= passing_score,
    }
}
