//! Response evaluation for every checklist item type.
//!
//! [`evaluate`] is a pure function of the item, the candidate response, any prior stored
//! response, and the current time. Persistence and events are the service's job.

mod rules;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ChecklistItem, ItemType};
use super::metadata::{ConfigurationError, ItemMetadata};
use super::quiz::{QuizError, QuizOutcome};
use super::response::{CandidateResponse, ItemResponse};

/// Where an accepted response leaves the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Complete,
    AwaitingApproval,
    Incomplete,
}

/// Extra context returned alongside an accepted response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationDetails {
    Choice {
        disqualifying_option_ids: Vec<String>,
        #[serde(default)]
        all_correct: Option<bool>,
    },
    PositiveAnswerRequired,
    Quiz(QuizOutcome),
    BookingUnconfirmed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub response: ItemResponse,
    pub completion: Completion,
    pub details: Option<EvaluationDetails>,
}

impl Evaluation {
    fn new(response: ItemResponse, completion: Completion) -> Self {
        Self {
            response,
            completion,
            details: None,
        }
    }

    fn with_details(mut self, details: Option<EvaluationDetails>) -> Self {
        self.details = details;
        self
    }

    pub fn completes(&self) -> bool {
        self.completion == Completion::Complete
    }
}

/// Problems with the submitted response itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("expected a {expected} response, received {found}")]
    TypeMismatch { expected: ItemType, found: ItemType },
    #[error("an explanation is required for this answer")]
    ExplanationRequired,
    #[error("select at least {min} option(s), received {found}")]
    TooFewSelections { min: u32, found: u32 },
    #[error("select at most {max} option(s), received {found}")]
    TooManySelections { max: u32, found: u32 },
    #[error("option '{0}' is not offered")]
    UnknownOption(String),
    #[error("option '{0}' was selected more than once")]
    DuplicateSelection(String),
    #[error("response must be at least {min} characters, received {found}")]
    TextTooShort { min: u32, found: u32 },
    #[error("response must be at most {max} characters, received {found}")]
    TextTooLong { max: u32, found: u32 },
    #[error("Response must include: {}", .0.join(", "))]
    MissingKeywords(Vec<String>),
    #[error("response does not match the required format")]
    PatternMismatch,
    #[error("the document must be acknowledged")]
    NotAcknowledged,
    #[error("the document must be scrolled to the end before acknowledging")]
    ScrollRequired,
    #[error("File must be downloaded first")]
    DownloadRequired,
    #[error("the link must be opened before confirming")]
    LinkNotVisited,
    #[error("the video must be watched")]
    VideoNotWatched,
    #[error("an uploaded document is required")]
    MissingDocument,
    #[error("a booking reference is required")]
    MissingBookingReference,
    #[error("{completed} of {total} signers is not a valid count")]
    InconsistentSignerCount { completed: u32, total: u32 },
    #[error("{with_number} of {total} carriers is not a valid count")]
    InconsistentCarrierCount { with_number: u32, total: u32 },
    #[error(transparent)]
    Quiz(#[from] QuizError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl From<QuizError> for EvaluationError {
    fn from(value: QuizError) -> Self {
        Self::Validation(ValidationError::Quiz(value))
    }
}

/// Evaluate a candidate response against an item.
pub fn evaluate(
    item: &ChecklistItem,
    candidate: &CandidateResponse,
    prior: Option<&ItemResponse>,
    now: DateTime<Utc>,
) -> Result<Evaluation, EvaluationError> {
    let mismatch = || ValidationError::TypeMismatch {
        expected: item.item_type(),
        found: candidate.item_type(),
    };

    match &item.metadata {
        ItemMetadata::DocumentUpload(metadata) => {
            let CandidateResponse::DocumentUpload {
                document_id,
                file_name,
            } = candidate
            else {
                return Err(mismatch().into());
            };
            rules::document_upload(metadata, document_id, file_name.as_deref(), now)
        }
        ItemMetadata::BooleanQuestion(metadata) => {
            let CandidateResponse::BooleanQuestion {
                answer,
                explanation,
            } = candidate
            else {
                return Err(mismatch().into());
            };
            rules::boolean_question(metadata, *answer, explanation.as_deref(), now)
        }
        ItemMetadata::MultipleChoice(metadata) => {
            let CandidateResponse::MultipleChoice {
                selected_option_ids,
            } = candidate
            else {
                return Err(mismatch().into());
            };
            rules::multiple_choice(metadata, selected_option_ids, now)
        }
        ItemMetadata::TextResponse(metadata) => {
            let CandidateResponse::TextResponse { text } = candidate else {
                return Err(mismatch().into());
            };
            rules::text_response(metadata, text, now)
        }
        ItemMetadata::Acknowledgment(metadata) => {
            let CandidateResponse::Acknowledgment {
                acknowledged,
                scroll_completed,
            } = candidate
            else {
                return Err(mismatch().into());
            };
            rules::acknowledgment(metadata, *acknowledged, *scroll_completed, now)
        }
        ItemMetadata::Quiz(metadata) => {
            let CandidateResponse::Quiz {
                attempt_number,
                answers,
            } = candidate
            else {
                return Err(mismatch().into());
            };
            let prior = match prior {
                Some(ItemResponse::Quiz(prior)) => Some(prior),
                _ => None,
            };
            rules::quiz(metadata, prior, *attempt_number, answers, now)
        }
        ItemMetadata::FileDownload(metadata) => {
            let CandidateResponse::FileDownload { action } = candidate else {
                return Err(mismatch().into());
            };
            let prior = match prior {
                Some(ItemResponse::FileDownload(prior)) => Some(prior),
                _ => None,
            };
            rules::file_download(metadata, prior, *action, now)
        }
        ItemMetadata::ExternalLink(metadata) => {
            let CandidateResponse::ExternalLink { action } = candidate else {
                return Err(mismatch().into());
            };
            let prior = match prior {
                Some(ItemResponse::ExternalLink(prior)) => Some(prior),
                _ => None,
            };
            rules::external_link(metadata, prior, *action, now)
        }
        ItemMetadata::VideoEmbed(metadata) => {
            let CandidateResponse::VideoEmbed {
                watched,
                fully_watched,
            } = candidate
            else {
                return Err(mismatch().into());
            };
            rules::video_embed(metadata, *watched, *fully_watched, now)
        }
        ItemMetadata::SignatureRequired(metadata) => {
            let CandidateResponse::SignatureRequired(response) = candidate else {
                return Err(mismatch().into());
            };
            rules::signature(metadata, response)
        }
        ItemMetadata::CarrierContracting(metadata) => {
            let CandidateResponse::CarrierContracting(response) = candidate else {
                return Err(mismatch().into());
            };
            rules::carrier_contracting(metadata, response)
        }
        ItemMetadata::SchedulingBooking(metadata) => {
            let CandidateResponse::SchedulingBooking {
                booking_reference,
                scheduled_for,
                confirmed,
            } = candidate
            else {
                return Err(mismatch().into());
            };
            rules::scheduling(metadata, booking_reference, *scheduled_for, *confirmed, now)
        }
    }
}
