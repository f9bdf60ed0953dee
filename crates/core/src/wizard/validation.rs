use std::sync::LazyLock;

use crate::wizard::states::{FieldErrors, LeadDraft, LeadField, WizardStep};

pub const MIN_DESCRIPTION_CHARS: usize = 20;
pub const PHONE_DIGITS: usize = 10;

#[allow(clippy::expect_used)]
pub static EMAIL_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("EMAIL_REGEX is a valid regex literal")
});

/// Validates the single field collected by `step`. An empty result means the
/// step may advance.
pub fn validate_step(step: WizardStep, draft: &LeadDraft) -> FieldErrors {
    match check_step(step, draft) {
        Some(message) => FieldErrors::single(step.field(), message),
        None => FieldErrors::default(),
    }
}

fn check_step(step: WizardStep, draft: &LeadDraft) -> Option<&'static str> {
    match step.field() {
        LeadField::CompanyName => {
            draft.company_name.trim().is_empty().then_some("Company name is required")
        }
        LeadField::AgentName => {
            draft.agent_name.trim().is_empty().then_some("AI Agent name is required")
        }
        LeadField::ServiceType => {
            draft.service_type.is_none().then_some("Please select a service type")
        }
        LeadField::Email => {
            if draft.email.trim().is_empty() {
                Some("Email is required")
            } else if !EMAIL_REGEX.is_match(&draft.email) {
                Some("Please enter a valid email")
            } else {
                None
            }
        }
        LeadField::Phone => {
            if draft.phone.trim().is_empty() {
                Some("Phone number is required")
            } else if phone_digits(&draft.phone).len() != PHONE_DIGITS {
                Some("Phone number must be exactly 10 digits")
            } else {
                None
            }
        }
        LeadField::Description => {
            let trimmed = draft.description.trim();
            if trimmed.is_empty() {
                Some("Description is required")
            } else if trimmed.chars().count() < MIN_DESCRIPTION_CHARS {
                Some("Please provide more details (at least 20 characters)")
            } else {
                None
            }
        }
    }
}

pub fn phone_digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Keeps at most ten digits and renders them as `ddd`, `(ddd) ddd` or
/// `(ddd) ddd-dddd` depending on how many were typed.
pub fn format_phone(value: &str) -> String {
    let digits: String = phone_digits(value).chars().take(PHONE_DIGITS).collect();
    let area = digits.get(..3.min(digits.len())).unwrap_or_default();
    let exchange = digits.get(3.min(digits.len())..6.min(digits.len())).unwrap_or_default();
    let line = digits.get(6.min(digits.len())..).unwrap_or_default();

    if exchange.is_empty() {
        return area.to_string();
    }
    if line.is_empty() {
        return format!("({area}) {exchange}");
    }
    format!("({area}) {exchange}-{line}")
}
