//! Template variables for automation content.
//!
//! Each trigger category exposes a fixed set of keys. Values are inserted through
//! [`TemplateVariables::insert`], which refuses keys outside the category, and rendered by a
//! [`TemplateFormatter`] that substitutes `{{key}}` placeholders.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCategory {
    Phase,
    Item,
    System,
}

impl TriggerCategory {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Phase => "phase",
            Self::Item => "item",
            Self::System => "system",
        }
    }

    pub const fn keys(self) -> &'static [TemplateKey] {
        use TemplateKey::*;
        match self {
            Self::Phase => &[
                RecruitName,
                RecruitFirstName,
                RecruitEmail,
                RecruitPhone,
                PhaseName,
                DaysInPhase,
                UplineName,
                UplineEmail,
                UplinePhone,
                PortalLink,
            ],
            Self::Item => &[
                RecruitName,
                RecruitFirstName,
                RecruitEmail,
                RecruitPhone,
                PhaseName,
                DaysInPhase,
                UplineName,
                UplineEmail,
                UplinePhone,
                PortalLink,
                ItemName,
                DaysUntilDeadline,
            ],
            Self::System => &[
                UserName,
                UserFirstName,
                UserLastName,
                UserEmail,
                HoursRemaining,
                PortalLink,
            ],
        }
    }

    pub fn allows(self, key: TemplateKey) -> bool {
        self.keys().contains(&key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKey {
    RecruitName,
    RecruitFirstName,
    RecruitEmail,
    RecruitPhone,
    PhaseName,
    DaysInPhase,
    UplineName,
    UplineEmail,
    UplinePhone,
    PortalLink,
    ItemName,
    DaysUntilDeadline,
    UserName,
    UserFirstName,
    UserLastName,
    UserEmail,
    HoursRemaining,
}

impl TemplateKey {
    pub const ALL: [TemplateKey; 17] = [
        Self::RecruitName,
        Self::RecruitFirstName,
        Self::RecruitEmail,
        Self::RecruitPhone,
        Self::PhaseName,
        Self::DaysInPhase,
        Self::UplineName,
        Self::UplineEmail,
        Self::UplinePhone,
        Self::PortalLink,
        Self::ItemName,
        Self::DaysUntilDeadline,
        Self::UserName,
        Self::UserFirstName,
        Self::UserLastName,
        Self::UserEmail,
        Self::HoursRemaining,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecruitName => "recruit_name",
            Self::RecruitFirstName => "recruit_first_name",
            Self::RecruitEmail => "recruit_email",
            Self::RecruitPhone => "recruit_phone",
            Self::PhaseName => "phase_name",
            Self::DaysInPhase => "days_in_phase",
            Self::UplineName => "upline_name",
            Self::UplineEmail => "upline_email",
            Self::UplinePhone => "upline_phone",
            Self::PortalLink => "portal_link",
            Self::ItemName => "item_name",
            Self::DaysUntilDeadline => "days_until_deadline",
            Self::UserName => "user_name",
            Self::UserFirstName => "user_first_name",
            Self::UserLastName => "user_last_name",
            Self::UserEmail => "user_email",
            Self::HoursRemaining => "hours_remaining",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{key} is not available to {category} automations")]
pub struct TemplateError {
    pub key: TemplateKey,
    pub category: &'static str,
}

/// Values for one rendering, restricted to a category's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateVariables {
    category: TriggerCategory,
    values: BTreeMap<TemplateKey, String>,
}

impl TemplateVariables {
    pub fn new(category: TriggerCategory) -> Self {
        Self {
            category,
            values: BTreeMap::new(),
        }
    }

    pub fn category(&self) -> TriggerCategory {
        self.category
    }

    pub fn insert(
        &mut self,
        key: TemplateKey,
        value: impl Into<String>,
    ) -> Result<(), TemplateError> {
        if !self.category.allows(key) {
            return Err(TemplateError {
                key,
                category: self.category.label(),
            });
        }
        self.values.insert(key, value.into());
        Ok(())
    }

    pub fn get(&self, key: TemplateKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        TemplateKey::from_name(name).and_then(|key| self.get(key))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Renders automation text against a set of variables.
pub trait TemplateFormatter: Send + Sync {
    fn render(&self, template: &str, variables: &TemplateVariables) -> String;
}

/// `{{key}}` substitution. Placeholders with no value are left as written.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderFormatter;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder pattern is a valid regex")
    })
}

impl TemplateFormatter for PlaceholderFormatter {
    fn render(&self, template: &str, variables: &TemplateVariables) -> String {
        placeholder_pattern()
            .replace_all(template, |captures: &Captures<'_>| {
                match variables.lookup(&captures[1]) {
                    Some(value) => value.to_string(),
                    None => captures[0].to_string(),
                }
            })
            .into_owned()
    }
}
