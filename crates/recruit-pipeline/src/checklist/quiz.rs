use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::metadata::ConfigurationError;

fn default_points() -> u32 {
    1
}

fn default_pass_threshold() -> u8 {
    70
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<QuizOption>,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl QuizQuestion {
    fn correct_ids(&self) -> BTreeSet<&str> {
        self.options
            .iter()
            .filter(|option| option.is_correct)
            .map(|option| option.id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizMetadata {
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: u8,
    #[serde(default = "default_true")]
    pub allow_retries: bool,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub randomize_questions: bool,
    #[serde(default)]
    pub randomize_options: bool,
    #[serde(default = "default_true")]
    pub show_correct_answers: bool,
}

impl QuizMetadata {
    /// Upper bound on attempts; `None` means unlimited.
    pub fn attempt_limit(&self) -> Option<u32> {
        if self.allow_retries {
            self.max_attempts
        } else {
            Some(1)
        }
    }

    pub fn total_points(&self) -> u64 {
        self.questions
            .iter()
            .map(|question| u64::from(question.points))
            .sum()
    }

    pub fn defects(&self) -> Vec<ConfigurationError> {
        let mut defects = Vec::new();
        if self.questions.is_empty() {
            defects.push(ConfigurationError::NoQuestions);
        }
        let mut seen = HashSet::new();
        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                defects.push(ConfigurationError::DuplicateQuestion(question.id.clone()));
            }
            if question.options.is_empty() {
                defects.push(ConfigurationError::QuestionWithoutOptions(
                    question.id.clone(),
                ));
            } else if question.correct_ids().is_empty() {
                defects.push(ConfigurationError::QuestionWithoutCorrectOption(
                    question.id.clone(),
                ));
            }
        }
        if !self.questions.is_empty() && self.total_points() == 0 {
            defects.push(ConfigurationError::ZeroPoints);
        }
        if self.pass_threshold > 100 {
            defects.push(ConfigurationError::InvalidPassThreshold(self.pass_threshold));
        }
        if self.max_attempts == Some(0) {
            defects.push(ConfigurationError::InvalidMaxAttempts);
        }
        defects
    }
}

/// Presentation order fixed when an attempt starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptPlan {
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub question_order: Vec<String>,
    pub option_order: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentedOption {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentedQuestion {
    pub id: String,
    pub prompt: String,
    pub points: u32,
    pub options: Vec<PresentedOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub answers: BTreeMap<String, Vec<String>>,
    pub correct_count: u32,
    pub total_questions: u32,
    pub earned_points: u64,
    pub total_points: u64,
    pub score_percent: u8,
    pub passed: bool,
}

/// Everything recorded about a recruit's quiz so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QuizResponse {
    #[serde(default)]
    pub attempts: Vec<QuizAttempt>,
    pub total_attempts: u32,
    pub best_score_percent: u8,
    pub passed: bool,
    #[serde(default)]
    pub passed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_attempt: Option<AttemptPlan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizState {
    NotStarted,
    Answering,
    Passed,
    FailedRetriable,
    FailedExhausted,
}

/// Result of grading one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub attempt: QuizAttempt,
    pub state: QuizState,
    pub perfect_score: bool,
    pub can_retry: bool,
    #[serde(default)]
    pub attempts_remaining: Option<u32>,
    #[serde(default)]
    pub correct_answers: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    #[error("quiz has already been passed")]
    AlreadyPassed,
    #[error("all {max} quiz attempts have been used")]
    AttemptsExhausted { max: u32 },
    #[error("expected attempt {expected}, received attempt {found}")]
    OutOfOrder { expected: u32, found: u32 },
    #[error("unanswered questions: {}", .0.join(", "))]
    UnansweredQuestions(Vec<String>),
    #[error("question '{0}' is not part of this quiz")]
    UnknownQuestion(String),
    #[error("option '{option}' is not offered for question '{question}'")]
    UnknownOption { question: String, option: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub correct_count: u32,
    pub total_questions: u32,
    pub earned_points: u64,
    pub total_points: u64,
    pub score_percent: u8,
}

/// Round `earned / total` to a whole percentage, halves rounding up.
pub fn percent_half_up(earned: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let scaled = (earned * 200 + total) / (total * 2);
    u8::try_from(scaled.min(100)).unwrap_or(100)
}

/// Grades attempts for one quiz item.
pub struct QuizEngine<'a> {
    metadata: &'a QuizMetadata,
}

impl<'a> QuizEngine<'a> {
    pub fn new(metadata: &'a QuizMetadata) -> Result<Self, ConfigurationError> {
        if let Some(defect) = metadata.defects().into_iter().next() {
            return Err(defect);
        }
        Ok(Self { metadata })
    }

    pub fn state(&self, prior: Option<&QuizResponse>) -> QuizState {
        let Some(prior) = prior else {
            return QuizState::NotStarted;
        };
        if prior.passed {
            return QuizState::Passed;
        }
        if let Some(limit) = self.metadata.attempt_limit() {
            if prior.total_attempts >= limit {
                return QuizState::FailedExhausted;
            }
        }
        if prior.current_attempt.is_some() {
            QuizState::Answering
        } else if prior.total_attempts > 0 {
            QuizState::FailedRetriable
        } else {
            QuizState::NotStarted
        }
    }

    fn ensure_open(&self, prior: Option<&QuizResponse>) -> Result<(), QuizError> {
        match self.state(prior) {
            QuizState::Passed => Err(QuizError::AlreadyPassed),
            QuizState::FailedExhausted => Err(QuizError::AttemptsExhausted {
                max: self.metadata.attempt_limit().unwrap_or_default(),
            }),
            QuizState::NotStarted | QuizState::Answering | QuizState::FailedRetriable => Ok(()),
        }
    }

    /// Open the next attempt with a freshly shuffled presentation order. Starting again
    /// while an attempt is already open returns the open attempt unchanged.
    pub fn start_attempt<R: Rng + ?Sized>(
        &self,
        prior: Option<&QuizResponse>,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<(QuizResponse, AttemptPlan), QuizError> {
        self.ensure_open(prior)?;
        let mut response = prior.cloned().unwrap_or_default();
        let next = response.total_attempts + 1;
        if let Some(plan) = &response.current_attempt {
            if plan.attempt_number == next {
                let plan = plan.clone();
                return Ok((response, plan));
            }
        }

        let mut question_order: Vec<String> = self
            .metadata
            .questions
            .iter()
            .map(|question| question.id.clone())
            .collect();
        if self.metadata.randomize_questions {
            question_order.shuffle(rng);
        }

        let mut option_order = BTreeMap::new();
        for question in &self.metadata.questions {
            let mut ids: Vec<String> = question
                .options
                .iter()
                .map(|option| option.id.clone())
                .collect();
            if self.metadata.randomize_options {
                ids.shuffle(rng);
            }
            option_order.insert(question.id.clone(), ids);
        }

        let plan = AttemptPlan {
            attempt_number: next,
            started_at: now,
            question_order,
            option_order,
        };
        response.current_attempt = Some(plan.clone());
        Ok((response, plan))
    }

    /// Questions in the plan's order with correctness stripped.
    pub fn present(&self, plan: &AttemptPlan) -> Vec<PresentedQuestion> {
        plan.question_order
            .iter()
            .filter_map(|id| self.metadata.questions.iter().find(|question| &question.id == id))
            .map(|question| {
                let order = plan.option_order.get(&question.id);
                let options = match order {
                    Some(order) => order
                        .iter()
                        .filter_map(|id| question.options.iter().find(|option| &option.id == id))
                        .collect::<Vec<_>>(),
                    None => question.options.iter().collect(),
                };
                PresentedQuestion {
                    id: question.id.clone(),
                    prompt: question.prompt.clone(),
                    points: question.points,
                    options: options
                        .into_iter()
                        .map(|option| PresentedOption {
                            id: option.id.clone(),
                            label: option.label.clone(),
                        })
                        .collect(),
                }
            })
            .collect()
    }

    pub fn score(&self, answers: &BTreeMap<String, Vec<String>>) -> Score {
        let mut correct_count = 0;
        let mut earned_points = 0;
        for question in &self.metadata.questions {
            let selected: BTreeSet<&str> = answers
                .get(&question.id)
                .map(|ids| ids.iter().map(String::as_str).collect())
                .unwrap_or_default();
            if selected == question.correct_ids() {
                correct_count += 1;
                earned_points += u64::from(question.points);
            }
        }
        let total_points = self.metadata.total_points();
        Score {
            correct_count,
            total_questions: u32::try_from(self.metadata.questions.len()).unwrap_or(u32::MAX),
            earned_points,
            total_points,
            score_percent: percent_half_up(earned_points, total_points),
        }
    }

    fn check_answers(&self, answers: &BTreeMap<String, Vec<String>>) -> Result<(), QuizError> {
        for (question_id, selected) in answers {
            let question = self
                .metadata
                .questions
                .iter()
                .find(|question| &question.id == question_id)
                .ok_or_else(|| QuizError::UnknownQuestion(question_id.clone()))?;
            for option in selected {
                if !question.options.iter().any(|candidate| &candidate.id == option) {
                    return Err(QuizError::UnknownOption {
                        question: question_id.clone(),
                        option: option.clone(),
                    });
                }
            }
        }

        let unanswered: Vec<String> = self
            .metadata
            .questions
            .iter()
            .filter(|question| answers.get(&question.id).map_or(true, Vec::is_empty))
            .map(|question| question.id.clone())
            .collect();
        if unanswered.is_empty() {
            Ok(())
        } else {
            Err(QuizError::UnansweredQuestions(unanswered))
        }
    }

    /// Grade a completed answer set. Attempts must arrive in order and every question
    /// must be answered. The returned response records the attempt whether or not it passed.
    pub fn submit(
        &self,
        prior: Option<&QuizResponse>,
        attempt_number: u32,
        answers: &BTreeMap<String, Vec<String>>,
        now: DateTime<Utc>,
    ) -> Result<(QuizResponse, QuizOutcome), QuizError> {
        self.ensure_open(prior)?;
        let mut response = prior.cloned().unwrap_or_default();
        let expected = response.total_attempts + 1;
        if attempt_number != expected {
            return Err(QuizError::OutOfOrder {
                expected,
                found: attempt_number,
            });
        }
        self.check_answers(answers)?;

        let normalized: BTreeMap<String, Vec<String>> = answers
            .iter()
            .map(|(question, selected)| {
                let set: BTreeSet<String> = selected.iter().cloned().collect();
                (question.clone(), set.into_iter().collect())
            })
            .collect();
        let score = self.score(&normalized);
        let passed = score.score_percent >= self.metadata.pass_threshold;
        let started_at = match response.current_attempt.take() {
            Some(plan) if plan.attempt_number == attempt_number => plan.started_at,
            _ => now,
        };

        let attempt = QuizAttempt {
            attempt_number,
            started_at,
            completed_at: now,
            answers: normalized,
            correct_count: score.correct_count,
            total_questions: score.total_questions,
            earned_points: score.earned_points,
            total_points: score.total_points,
            score_percent: score.score_percent,
            passed,
        };

        response.total_attempts = attempt_number;
        response.best_score_percent = response.best_score_percent.max(score.score_percent);
        if passed {
            response.passed = true;
            response.passed_at = Some(now);
        }
        response.attempts.push(attempt.clone());

        let state = self.state(Some(&response));
        let attempts_remaining = self
            .metadata
            .attempt_limit()
            .map(|limit| limit.saturating_sub(response.total_attempts));
        let correct_answers = self.metadata.show_correct_answers.then(|| {
            self.metadata
                .questions
                .iter()
                .map(|question| {
                    let ids = question
                        .correct_ids()
                        .into_iter()
                        .map(str::to_string)
                        .collect();
                    (question.id.clone(), ids)
                })
                .collect()
        });

        let outcome = QuizOutcome {
            perfect_score: score.total_points > 0 && score.earned_points == score.total_points,
            can_retry: state == QuizState::FailedRetriable,
            state,
            attempts_remaining,
            correct_answers,
            attempt,
        };
        Ok((response, outcome))
    }
}
