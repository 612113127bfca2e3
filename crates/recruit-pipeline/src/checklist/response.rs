use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::contracting::CarrierContractingResponse;
use super::domain::ItemType;
use super::quiz::QuizResponse;
use super::signature::SignatureResponse;

/// Stored, type-specific response on a progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemResponse {
    DocumentUpload(DocumentUploadResponse),
    BooleanQuestion(BooleanQuestionResponse),
    MultipleChoice(MultipleChoiceResponse),
    TextResponse(TextResponseData),
    Acknowledgment(AcknowledgmentResponse),
    Quiz(QuizResponse),
    FileDownload(FileDownloadResponse),
    ExternalLink(ExternalLinkResponse),
    VideoEmbed(VideoEmbedResponse),
    SignatureRequired(SignatureResponse),
    CarrierContracting(CarrierContractingResponse),
    SchedulingBooking(SchedulingResponse),
}

impl ItemResponse {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::DocumentUpload(_) => ItemType::DocumentUpload,
            Self::BooleanQuestion(_) => ItemType::BooleanQuestion,
            Self::MultipleChoice(_) => ItemType::MultipleChoice,
            Self::TextResponse(_) => ItemType::TextResponse,
            Self::Acknowledgment(_) => ItemType::Acknowledgment,
            Self::Quiz(_) => ItemType::Quiz,
            Self::FileDownload(_) => ItemType::FileDownload,
            Self::ExternalLink(_) => ItemType::ExternalLink,
            Self::VideoEmbed(_) => ItemType::VideoEmbed,
            Self::SignatureRequired(_) => ItemType::SignatureRequired,
            Self::CarrierContracting(_) => ItemType::CarrierContracting,
            Self::SchedulingBooking(_) => ItemType::SchedulingBooking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUploadResponse {
    pub document_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanQuestionResponse {
    pub answer: bool,
    #[serde(default)]
    pub explanation: Option<String>,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleChoiceResponse {
    pub selected_option_ids: Vec<String>,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextResponseData {
    pub text: String,
    pub character_count: u32,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgmentResponse {
    pub acknowledged: bool,
    pub scroll_completed: bool,
    pub acknowledged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileDownloadResponse {
    pub downloaded: bool,
    #[serde(default)]
    pub downloaded_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExternalLinkResponse {
    pub clicked: bool,
    #[serde(default)]
    pub clicked_at: Option<DateTime<Utc>>,
    pub returned: bool,
    #[serde(default)]
    pub returned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEmbedResponse {
    pub watched: bool,
    /// Self-reported by the recruit.
    pub fully_watched: bool,
    pub watched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingResponse {
    pub booking_reference: String,
    pub scheduled_for: DateTime<Utc>,
    pub confirmed: bool,
    pub booked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadAction {
    Download,
    Acknowledge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkAction {
    Click,
    ConfirmReturn,
}

/// Incoming response awaiting evaluation against an item's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CandidateResponse {
    DocumentUpload {
        document_id: String,
        #[serde(default)]
        file_name: Option<String>,
    },
    BooleanQuestion {
        answer: bool,
        #[serde(default)]
        explanation: Option<String>,
    },
    MultipleChoice {
        selected_option_ids: Vec<String>,
    },
    TextResponse {
        text: String,
    },
    Acknowledgment {
        acknowledged: bool,
        #[serde(default)]
        scroll_completed: bool,
    },
    Quiz {
        attempt_number: u32,
        answers: BTreeMap<String, Vec<String>>,
    },
    FileDownload {
        action: DownloadAction,
    },
    ExternalLink {
        action: LinkAction,
    },
    VideoEmbed {
        watched: bool,
        #[serde(default)]
        fully_watched: bool,
    },
    SignatureRequired(SignatureResponse),
    CarrierContracting(CarrierContractingResponse),
    SchedulingBooking {
        booking_reference: String,
        scheduled_for: DateTime<Utc>,
        #[serde(default)]
        confirmed: bool,
    },
}

impl CandidateResponse {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::DocumentUpload { .. } => ItemType::DocumentUpload,
            Self::BooleanQuestion { .. } => ItemType::BooleanQuestion,
            Self::MultipleChoice { .. } => ItemType::MultipleChoice,
            Self::TextResponse { .. } => ItemType::TextResponse,
            Self::Acknowledgment { .. } => ItemType::Acknowledgment,
            Self::Quiz { .. } => ItemType::Quiz,
            Self::FileDownload { .. } => ItemType::FileDownload,
            Self::ExternalLink { .. } => ItemType::ExternalLink,
            Self::VideoEmbed { .. } => ItemType::VideoEmbed,
            Self::SignatureRequired(_) => ItemType::SignatureRequired,
            Self::CarrierContracting(_) => ItemType::CarrierContracting,
            Self::SchedulingBooking { .. } => ItemType::SchedulingBooking,
        }
    }

    /// Responses produced by the signature and contracting workflows rather than typed in
    /// by a person. They are never accepted from a direct submission.
    pub fn is_system_derived(&self) -> bool {
        matches!(
            self,
            Self::SignatureRequired(_) | Self::CarrierContracting(_)
        )
    }
}
