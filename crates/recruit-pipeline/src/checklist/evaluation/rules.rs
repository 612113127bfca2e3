use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};

use super::{Completion, Evaluation, EvaluationDetails, EvaluationError, ValidationError};
use crate::checklist::contracting::{CarrierContractingMetadata, CarrierContractingResponse};
use crate::checklist::metadata::{
    AcknowledgmentMetadata, BooleanQuestionMetadata, DocumentUploadMetadata, DownloadCompletion,
    ExternalLinkMetadata, FileDownloadMetadata, LinkCompletion, MultipleChoiceMetadata,
    SchedulingMetadata, TextResponseMetadata, VideoEmbedMetadata,
};
use crate::checklist::quiz::{QuizEngine, QuizMetadata, QuizResponse};
use crate::checklist::response::{
    AcknowledgmentResponse, BooleanQuestionResponse, DocumentUploadResponse, DownloadAction,
    ExternalLinkResponse, FileDownloadResponse, ItemResponse, LinkAction, MultipleChoiceResponse,
    SchedulingResponse, TextResponseData, VideoEmbedResponse,
};
use crate::checklist::signature::{SignatureRequiredMetadata, SignatureResponse, SubmissionStatus};

type Outcome = Result<Evaluation, EvaluationError>;

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(super) fn document_upload(
    metadata: &DocumentUploadMetadata,
    document_id: &str,
    file_name: Option<&str>,
    now: DateTime<Utc>,
) -> Outcome {
    let document_id = document_id.trim();
    if document_id.is_empty() {
        return Err(ValidationError::MissingDocument.into());
    }
    let completion = if metadata.requires_verification {
        Completion::AwaitingApproval
    } else {
        Completion::Complete
    };
    Ok(Evaluation::new(
        ItemResponse::DocumentUpload(DocumentUploadResponse {
            document_id: document_id.to_string(),
            file_name: non_blank(file_name),
            uploaded_at: now,
        }),
        completion,
    ))
}

pub(super) fn boolean_question(
    metadata: &BooleanQuestionMetadata,
    answer: bool,
    explanation: Option<&str>,
    now: DateTime<Utc>,
) -> Outcome {
    let explanation = non_blank(explanation);
    if metadata.explanation_required.applies_to(answer) && explanation.is_none() {
        return Err(ValidationError::ExplanationRequired.into());
    }

    let response = ItemResponse::BooleanQuestion(BooleanQuestionResponse {
        answer,
        explanation,
        answered_at: now,
    });
    if !metadata.require_positive || answer {
        Ok(Evaluation::new(response, Completion::Complete))
    } else {
        Ok(Evaluation::new(response, Completion::Incomplete)
            .with_details(Some(EvaluationDetails::PositiveAnswerRequired)))
    }
}

pub(super) fn multiple_choice(
    metadata: &MultipleChoiceMetadata,
    selected: &[String],
    now: DateTime<Utc>,
) -> Outcome {
    metadata.check()?;

    let mut seen = HashSet::new();
    for id in selected {
        if !seen.insert(id.as_str()) {
            return Err(ValidationError::DuplicateSelection(id.clone()).into());
        }
        if !metadata.options.iter().any(|option| &option.id == id) {
            return Err(ValidationError::UnknownOption(id.clone()).into());
        }
    }

    let found = to_u32(selected.len());
    let min = metadata.min_selections.unwrap_or(1);
    if found < min {
        return Err(ValidationError::TooFewSelections { min, found }.into());
    }
    if let Some(max) = metadata.max_selections {
        if found > max {
            return Err(ValidationError::TooManySelections { max, found }.into());
        }
    }

    let disqualifying: Vec<String> = metadata
        .options
        .iter()
        .filter(|option| option.is_disqualifying && seen.contains(option.id.as_str()))
        .map(|option| option.id.clone())
        .collect();
    if !disqualifying.is_empty() {
        tracing::debug!(options = ?disqualifying, "disqualifying options selected");
    }

    let all_correct = metadata.require_correct.then(|| {
        let correct: BTreeSet<&str> = metadata
            .options
            .iter()
            .filter(|option| option.is_correct)
            .map(|option| option.id.as_str())
            .collect();
        let chosen: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
        correct == chosen
    });

    let completion = if all_correct.unwrap_or(true) {
        Completion::Complete
    } else {
        Completion::Incomplete
    };
    let details = (!disqualifying.is_empty() || all_correct.is_some()).then(|| {
        EvaluationDetails::Choice {
            disqualifying_option_ids: disqualifying,
            all_correct,
        }
    });

    Ok(Evaluation::new(
        ItemResponse::MultipleChoice(MultipleChoiceResponse {
            selected_option_ids: selected.to_vec(),
            answered_at: now,
        }),
        completion,
    )
    .with_details(details))
}

pub(super) fn text_response(
    metadata: &TextResponseMetadata,
    text: &str,
    now: DateTime<Utc>,
) -> Outcome {
    metadata.check()?;

    let text = text.trim();
    let found = to_u32(text.chars().count());
    let min = metadata.min_length.unwrap_or(1);
    if found < min {
        return Err(ValidationError::TextTooShort { min, found }.into());
    }
    if let Some(max) = metadata.max_length {
        if found > max {
            return Err(ValidationError::TextTooLong { max, found }.into());
        }
    }

    let lowered = text.to_lowercase();
    let missing: Vec<String> = metadata
        .required_keywords
        .iter()
        .filter(|keyword| !keyword.trim().is_empty())
        .filter(|keyword| !lowered.contains(&keyword.trim().to_lowercase()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingKeywords(missing).into());
    }

    if let Some(pattern) = metadata.pattern()? {
        if !pattern.is_match(text) {
            return Err(ValidationError::PatternMismatch.into());
        }
    }

    Ok(Evaluation::new(
        ItemResponse::TextResponse(TextResponseData {
            text: text.to_string(),
            character_count: found,
            submitted_at: now,
        }),
        Completion::Complete,
    ))
}

pub(super) fn acknowledgment(
    metadata: &AcknowledgmentMetadata,
    acknowledged: bool,
    scroll_completed: bool,
    now: DateTime<Utc>,
) -> Outcome {
    if !acknowledged {
        return Err(ValidationError::NotAcknowledged.into());
    }
    if metadata.require_scroll && !scroll_completed {
        return Err(ValidationError::ScrollRequired.into());
    }
    Ok(Evaluation::new(
        ItemResponse::Acknowledgment(AcknowledgmentResponse {
            acknowledged,
            scroll_completed,
            acknowledged_at: now,
        }),
        Completion::Complete,
    ))
}

pub(super) fn quiz(
    metadata: &QuizMetadata,
    prior: Option<&QuizResponse>,
    attempt_number: u32,
    answers: &BTreeMap<String, Vec<String>>,
    now: DateTime<Utc>,
) -> Outcome {
    let engine = QuizEngine::new(metadata)?;
    let (response, outcome) = engine.submit(prior, attempt_number, answers, now)?;
    let completion = if outcome.attempt.passed {
        Completion::Complete
    } else {
        Completion::Incomplete
    };
    Ok(Evaluation::new(ItemResponse::Quiz(response), completion)
        .with_details(Some(EvaluationDetails::Quiz(outcome))))
}

pub(super) fn file_download(
    metadata: &FileDownloadMetadata,
    prior: Option<&FileDownloadResponse>,
    action: DownloadAction,
    now: DateTime<Utc>,
) -> Outcome {
    metadata.file_url()?;
    let mut state = prior.cloned().unwrap_or_default();

    let completion = match action {
        DownloadAction::Download => {
            state.downloaded = true;
            state.downloaded_at.get_or_insert(now);
            match metadata.completion_method {
                DownloadCompletion::OnDownload => Completion::Complete,
                DownloadCompletion::Acknowledge => Completion::Incomplete,
            }
        }
        DownloadAction::Acknowledge => {
            if !state.downloaded {
                return Err(ValidationError::DownloadRequired.into());
            }
            state.acknowledged = true;
            state.acknowledged_at = Some(now);
            Completion::Complete
        }
    };
    Ok(Evaluation::new(ItemResponse::FileDownload(state), completion))
}

pub(super) fn external_link(
    metadata: &ExternalLinkMetadata,
    prior: Option<&ExternalLinkResponse>,
    action: LinkAction,
    now: DateTime<Utc>,
) -> Outcome {
    metadata.url()?;
    let mut state = prior.cloned().unwrap_or_default();

    let completion = match action {
        LinkAction::Click => {
            state.clicked = true;
            state.clicked_at.get_or_insert(now);
            match metadata.completion_method {
                LinkCompletion::OnClick => Completion::Complete,
                LinkCompletion::ConfirmReturn => Completion::Incomplete,
            }
        }
        LinkAction::ConfirmReturn => {
            if !state.clicked {
                return Err(ValidationError::LinkNotVisited.into());
            }
            state.returned = true;
            state.returned_at = Some(now);
            Completion::Complete
        }
    };
    Ok(Evaluation::new(ItemResponse::ExternalLink(state), completion))
}

pub(super) fn video_embed(
    metadata: &VideoEmbedMetadata,
    watched: bool,
    fully_watched: bool,
    now: DateTime<Utc>,
) -> Outcome {
    metadata.video_url()?;
    if !watched {
        return Err(ValidationError::VideoNotWatched.into());
    }
    let completion = if metadata.auto_complete {
        Completion::Complete
    } else {
        Completion::AwaitingApproval
    };
    Ok(Evaluation::new(
        ItemResponse::VideoEmbed(VideoEmbedResponse {
            watched,
            fully_watched,
            watched_at: now,
        }),
        completion,
    ))
}

pub(super) fn signature(
    metadata: &SignatureRequiredMetadata,
    response: &SignatureResponse,
) -> Outcome {
    metadata.check()?;
    if response.signers_completed > response.signers_total {
        return Err(ValidationError::InconsistentSignerCount {
            completed: response.signers_completed,
            total: response.signers_total,
        }
        .into());
    }
    let done = response.submission_status == SubmissionStatus::Completed
        && response.signers_total > 0
        && response.signers_completed == response.signers_total;
    let completion = if done {
        Completion::Complete
    } else {
        Completion::Incomplete
    };
    Ok(Evaluation::new(
        ItemResponse::SignatureRequired(response.clone()),
        completion,
    ))
}

pub(super) fn carrier_contracting(
    metadata: &CarrierContractingMetadata,
    response: &CarrierContractingResponse,
) -> Outcome {
    if response.carriers_with_writing_number > response.carriers_total {
        return Err(ValidationError::InconsistentCarrierCount {
            with_number: response.carriers_with_writing_number,
            total: response.carriers_total,
        }
        .into());
    }
    let completion = if response.criteria_met(metadata)? {
        Completion::Complete
    } else {
        Completion::Incomplete
    };
    Ok(Evaluation::new(
        ItemResponse::CarrierContracting(response.clone()),
        completion,
    ))
}

pub(super) fn scheduling(
    metadata: &SchedulingMetadata,
    booking_reference: &str,
    scheduled_for: DateTime<Utc>,
    confirmed: bool,
    now: DateTime<Utc>,
) -> Outcome {
    metadata.booking_url()?;
    let booking_reference = booking_reference.trim();
    if booking_reference.is_empty() {
        return Err(ValidationError::MissingBookingReference.into());
    }
    let response = ItemResponse::SchedulingBooking(SchedulingResponse {
        booking_reference: booking_reference.to_string(),
        scheduled_for,
        confirmed,
        booked_at: now,
    });
    if confirmed || !metadata.require_confirmation {
        Ok(Evaluation::new(response, Completion::Complete))
    } else {
        Ok(Evaluation::new(response, Completion::Incomplete)
            .with_details(Some(EvaluationDetails::BookingUnconfirmed)))
    }
}
