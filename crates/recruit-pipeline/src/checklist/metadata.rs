use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::contracting::CarrierContractingMetadata;
use super::domain::ItemType;
use super::quiz::QuizMetadata;
use super::signature::SignatureRequiredMetadata;

/// Type-specific configuration attached to a checklist item.
///
/// Fields an evaluator cannot work without are still optional here; a missing one surfaces
/// as a [`ConfigurationError`] when a response is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemMetadata {
    DocumentUpload(DocumentUploadMetadata),
    BooleanQuestion(BooleanQuestionMetadata),
    MultipleChoice(MultipleChoiceMetadata),
    TextResponse(TextResponseMetadata),
    Acknowledgment(AcknowledgmentMetadata),
    Quiz(QuizMetadata),
    FileDownload(FileDownloadMetadata),
    ExternalLink(ExternalLinkMetadata),
    VideoEmbed(VideoEmbedMetadata),
    SignatureRequired(SignatureRequiredMetadata),
    CarrierContracting(CarrierContractingMetadata),
    SchedulingBooking(SchedulingMetadata),
}

impl ItemMetadata {
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

    /// Authoring-time check listing every defect an evaluator would hit at runtime.
    pub fn defects(&self) -> Vec<ConfigurationError> {
        let mut defects = Vec::new();
        match self {
            Self::DocumentUpload(_) | Self::BooleanQuestion(_) | Self::Acknowledgment(_) => {}
            Self::MultipleChoice(metadata) => {
                if let Err(err) = metadata.check() {
                    defects.push(err);
                }
            }
            Self::TextResponse(metadata) => {
                if let Err(err) = metadata.check() {
                    defects.push(err);
                }
            }
            Self::Quiz(metadata) => defects.extend(metadata.defects()),
            Self::FileDownload(metadata) => {
                if let Err(err) = metadata.file_url() {
                    defects.push(err);
                }
            }
            Self::ExternalLink(metadata) => {
                if let Err(err) = metadata.url() {
                    defects.push(err);
                }
            }
            Self::VideoEmbed(metadata) => {
                if let Err(err) = metadata.video_url() {
                    defects.push(err);
                }
            }
            Self::SignatureRequired(metadata) => {
                if let Err(err) = metadata.check() {
                    defects.push(err);
                }
            }
            Self::CarrierContracting(metadata) => {
                if let Err(err) = metadata.check() {
                    defects.push(err);
                }
            }
            Self::SchedulingBooking(metadata) => {
                if let Err(err) = metadata.booking_url() {
                    defects.push(err);
                }
            }
        }
        defects
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self.defects().into_iter().next() {
            Some(defect) => Err(defect),
            None => Ok(()),
        }
    }
}

/// Authoring defects that surface while evaluating a response. Distinct from user
/// validation errors so callers can tell a broken item from a bad answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{item_type} item is missing its {field}")]
    MissingField {
        item_type: ItemType,
        field: &'static str,
    },
    #[error("multiple choice item has no options")]
    NoOptions,
    #[error("option id '{0}' is defined more than once")]
    DuplicateOption(String),
    #[error("selection bounds are inverted (min {min}, max {max})")]
    InvalidSelectionBounds { min: u32, max: u32 },
    #[error("require_correct is set but no option is marked correct")]
    NoCorrectOption,
    #[error("length bounds are inverted (min {min}, max {max})")]
    InvalidLengthBounds { min: u32, max: u32 },
    #[error("validation pattern '{pattern}' does not compile: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("quiz has no questions")]
    NoQuestions,
    #[error("quiz question '{0}' has no correct option")]
    QuestionWithoutCorrectOption(String),
    #[error("quiz question '{0}' has no options")]
    QuestionWithoutOptions(String),
    #[error("quiz question id '{0}' is defined more than once")]
    DuplicateQuestion(String),
    #[error("quiz total points must be greater than zero")]
    ZeroPoints,
    #[error("pass threshold {0} is outside 0-100")]
    InvalidPassThreshold(u8),
    #[error("max_attempts must be at least 1")]
    InvalidMaxAttempts,
    #[error("signature item lists no required signer roles")]
    NoSignerRoles,
    #[error("custom signer email '{0}' is not a valid address")]
    InvalidSignerEmail(String),
    #[error("count-based contracting completion requires required_count >= 1")]
    MissingRequiredCount,
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocumentUploadMetadata {
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub requires_verification: bool,
}

/// When a yes/no question demands a written explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationRequirement {
    #[default]
    Never,
    Always,
    OnNegative,
    OnPositive,
}

impl ExplanationRequirement {
    pub fn applies_to(self, answer: bool) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::OnNegative => !answer,
            Self::OnPositive => answer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BooleanQuestionMetadata {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub positive_label: Option<String>,
    #[serde(default)]
    pub negative_label: Option<String>,
    #[serde(default)]
    pub require_positive: bool,
    #[serde(default)]
    pub explanation_required: ExplanationRequirement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub is_disqualifying: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MultipleChoiceMetadata {
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
    #[serde(default)]
    pub min_selections: Option<u32>,
    #[serde(default)]
    pub max_selections: Option<u32>,
    #[serde(default)]
    pub require_correct: bool,
}

impl MultipleChoiceMetadata {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        if self.options.is_empty() {
            return Err(ConfigurationError::NoOptions);
        }
        let mut seen = HashSet::new();
        for option in &self.options {
            if !seen.insert(option.id.as_str()) {
                return Err(ConfigurationError::DuplicateOption(option.id.clone()));
            }
        }
        if let (Some(min), Some(max)) = (self.min_selections, self.max_selections) {
            if min > max {
                return Err(ConfigurationError::InvalidSelectionBounds { min, max });
            }
        }
        if self.require_correct && !self.options.iter().any(|option| option.is_correct) {
            return Err(ConfigurationError::NoCorrectOption);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TextResponseMetadata {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub required_keywords: Vec<String>,
    #[serde(default)]
    pub validation_pattern: Option<String>,
}

impl TextResponseMetadata {
    pub fn check(&self) -> Result<(), ConfigurationError> {
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(ConfigurationError::InvalidLengthBounds { min, max });
            }
        }
        self.pattern().map(|_| ())
    }

    pub fn pattern(&self) -> Result<Option<Regex>, ConfigurationError> {
        match present(&self.validation_pattern) {
            Some(pattern) => Regex::new(pattern)
                .map(Some)
                .map_err(|err| ConfigurationError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: err.to_string(),
                }),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AcknowledgmentMetadata {
    #[serde(default)]
    pub document_text: Option<String>,
    #[serde(default)]
    pub require_scroll: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadCompletion {
    OnDownload,
    #[default]
    Acknowledge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileDownloadMetadata {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub completion_method: DownloadCompletion,
}

impl FileDownloadMetadata {
    pub fn file_url(&self) -> Result<&str, ConfigurationError> {
        present(&self.file_url).ok_or(ConfigurationError::MissingField {
            item_type: ItemType::FileDownload,
            field: "file_url",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkCompletion {
    OnClick,
    #[default]
    ConfirmReturn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExternalLinkMetadata {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub completion_method: LinkCompletion,
}

impl ExternalLinkMetadata {
    pub fn url(&self) -> Result<&str, ConfigurationError> {
        present(&self.url).ok_or(ConfigurationError::MissingField {
            item_type: ItemType::ExternalLink,
            field: "url",
        })
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEmbedMetadata {
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default = "default_true")]
    pub auto_complete: bool,
    /// Advisory only; the player cannot prove a full watch.
    #[serde(default)]
    pub require_full_watch: bool,
}

impl Default for VideoEmbedMetadata {
    fn default() -> Self {
        Self {
            video_url: None,
            auto_complete: true,
            require_full_watch: false,
        }
    }
}

impl VideoEmbedMetadata {
    pub fn video_url(&self) -> Result<&str, ConfigurationError> {
        present(&self.video_url).ok_or(ConfigurationError::MissingField {
            item_type: ItemType::VideoEmbed,
            field: "video_url",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingMetadata {
    #[serde(default)]
    pub booking_url: Option<String>,
    #[serde(default = "default_true")]
    pub require_confirmation: bool,
}

impl SchedulingMetadata {
    pub fn booking_url(&self) -> Result<&str, ConfigurationError> {
        present(&self.booking_url).ok_or(ConfigurationError::MissingField {
            item_type: ItemType::SchedulingBooking,
            field: "booking_url",
        })
    }
}
