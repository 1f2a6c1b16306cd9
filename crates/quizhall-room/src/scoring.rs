//! Scoring: correctness and points for one submission.
//!
//! Awards are binary. A correct choice earns the question's full points,
//! anything else earns nothing, and open-text answers are never graded.

use std::time::Duration;

use quizhall_protocol::{PlayerSummary, QuestionKind};
use tracing::trace;

use crate::Question;

/// What a player sent for the open question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// An option index, already range-checked.
    Choice(usize),
    /// Free text, already trimmed.
    Text(String),
}

/// The result of scoring one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// `None` for open-text questions, which have no right answer.
    pub correct: Option<bool>,
    /// Points to add to the player's total.
    pub points_awarded: u32,
}

/// Scores `submission` against `question`.
///
/// `elapsed` is how long the question had been open. It does not affect
/// the award.
pub fn score(question: &Question, submission: &Submission, elapsed: Duration) -> ScoreOutcome {
    let outcome = match (question.kind, submission) {
        (QuestionKind::OpenText, _) => ScoreOutcome {
            correct: None,
            points_awarded: 0,
        },
        (_, Submission::Choice(index)) => {
            let correct = question.correct_index() == Some(*index);
            ScoreOutcome {
                correct: Some(correct),
                points_awarded: if correct { question.points } else { 0 },
            }
        }
        (_, Submission::Text(_)) => ScoreOutcome {
            correct: Some(false),
            points_awarded: 0,
        },
    };
    trace!(
        correct = ?outcome.correct,
        points = outcome.points_awarded,
        elapsed_ms = elapsed.as_millis() as u64,
        "submission scored"
    );
    outcome
}

/// Orders a roster by descending score. The sort is stable, so ties keep
/// roster (join) order.
pub fn standings(mut roster: Vec<PlayerSummary>) -> Vec<PlayerSummary> {
    roster.sort_by(|a, b| b.score.cmp(&a.score));
    roster
}
