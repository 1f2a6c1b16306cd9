//! The quiz model, as fetched from the authoring store.
//!
//! A [`Quiz`] is immutable once a room has been created from it; the room
//! holds it behind an `Arc` and never re-fetches it.

use quizhall_protocol::{QuestionKind, QuizId};
use serde::{Deserialize, Serialize};

const DEFAULT_TIME_LIMIT_SECS: u32 = 15;
const DEFAULT_POINTS: u32 = 10;
const TRUE_FALSE_OPTIONS: [&str; 2] = ["True", "False"];

fn default_time_limit() -> u32 {
    DEFAULT_TIME_LIMIT_SECS
}

fn default_points() -> u32 {
    DEFAULT_POINTS
}

/// An ordered set of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: QuizId,
    pub title: String,
    pub questions: Vec<Question>,
}

/// The expected answer of a choice question.
///
/// Authoring tools store either the option index or the option text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Index(usize),
    Literal(String),
}

/// One question of a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,

    #[serde(rename = "type")]
    pub kind: QuestionKind,

    /// Empty for open-text questions. A true/false question may leave it
    /// empty to get `["True", "False"]`.
    #[serde(default)]
    pub options: Vec<String>,

    #[serde(default)]
    pub correct_answer: Option<CorrectAnswer>,

    #[serde(rename = "time_limit", default = "default_time_limit")]
    pub time_limit_secs: u32,

    #[serde(default = "default_points")]
    pub points: u32,
}

impl Question {
    /// The options shown to players.
    pub fn options(&self) -> Vec<&str> {
        if self.kind == QuestionKind::TrueFalse && self.options.is_empty() {
            TRUE_FALSE_OPTIONS.to_vec()
        } else {
            self.options.iter().map(String::as_str).collect()
        }
    }

    /// Index of the correct option, if the question has one.
    ///
    /// A literal matches the first option whose text equals it, ignoring
    /// surrounding whitespace. Matching is case-sensitive.
    pub fn correct_index(&self) -> Option<usize> {
        let options = self.options();
        match self.correct_answer.as_ref()? {
            CorrectAnswer::Index(i) => (*i < options.len()).then_some(*i),
            CorrectAnswer::Literal(text) => {
                let wanted = text.trim();
                options.iter().position(|opt| opt.trim() == wanted)
            }
        }
    }

    /// The correct answer as shown to players: the option text when it
    /// resolves, otherwise the raw literal.
    pub fn correct_answer_text(&self) -> Option<String> {
        if let Some(i) = self.correct_index() {
            return self.options().get(i).map(|s| s.to_string());
        }
        match self.correct_answer.as_ref()? {
            CorrectAnswer::Literal(text) => Some(text.clone()),
            CorrectAnswer::Index(_) => None,
        }
    }
}

/// Reasons a quiz cannot be played.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("quiz has no questions")]
    NoQuestions,

    #[error("question {number} has no text")]
    EmptyText { number: usize },

    #[error("question {number} has {count} options (expected 2 to 4)")]
    OptionCount { number: usize, count: usize },

    #[error("question {number} has no correct answer")]
    MissingCorrectAnswer { number: usize },

    #[error("question {number} has a correct answer that matches no option")]
    UnknownCorrectAnswer { number: usize },

    #[error("open question {number} must not have a correct answer")]
    UnexpectedCorrectAnswer { number: usize },

    #[error("question {number} has a zero time limit")]
    ZeroTimeLimit { number: usize },
}

impl Quiz {
    /// Number of questions.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Returns `true` if the quiz has no questions.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Checks that every question can be played and scored.
    ///
    /// # Errors
    /// Returns the first [`QuizError`] found, numbering questions from 1.
    pub fn validate(&self) -> Result<(), QuizError> {
        if self.questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }

        for (i, q) in self.questions.iter().enumerate() {
            let number = i + 1;
            if q.text.trim().is_empty() {
                return Err(QuizError::EmptyText { number });
            }
            if q.time_limit_secs == 0 {
                return Err(QuizError::ZeroTimeLimit { number });
            }

            if q.kind.is_choice() {
                let count = q.options().len();
                if !(2..=4).contains(&count) {
                    return Err(QuizError::OptionCount { number, count });
                }
                if q.correct_answer.is_none() {
                    return Err(QuizError::MissingCorrectAnswer { number });
                }
                if q.correct_index().is_none() {
                    return Err(QuizError::UnknownCorrectAnswer { number });
                }
            } else if q.correct_answer.is_some() {
                return Err(QuizError::UnexpectedCorrectAnswer { number });
            }
        }
        Ok(())
    }
}
