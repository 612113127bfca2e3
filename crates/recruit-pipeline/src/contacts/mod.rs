//! Contact lookup for recruits, their assigned team members, and agency staff.

mod directory;
mod resolver;

use std::sync::OnceLock;

use regex::Regex;

pub use directory::{AgencyRecord, ContactDirectory, ContactRecord, DirectoryError, RecruitRecord};
pub use resolver::{
    ConcreteContact, ContactRole, RecipientResolver, Requirement, ResolutionError,
    SenderIdentity,
};

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
    })
}

pub fn is_valid_email(candidate: &str) -> bool {
    email_pattern().is_match(candidate.trim())
}

#[cfg(test)]
mod tests {
    use super::is_valid_email;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("jane.doe@agency.com"));
        assert!(is_valid_email("  ops+alerts@sub.agency.io "));
    }

    #[test]
    fn rejects_addresses_without_domain_dot_or_at() {
        assert!(!is_valid_email("jane.doe"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("jane doe@agency.com"));
        assert!(!is_valid_email(""));
    }
}
