use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::wizard::validation::format_phone;

pub const TOTAL_STEPS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    CompanyName,
    AgentName,
    ServiceType,
    Email,
    Phone,
    Description,
}

impl WizardStep {
    pub const ALL: [WizardStep; TOTAL_STEPS] = [
        Self::CompanyName,
        Self::AgentName,
        Self::ServiceType,
        Self::Email,
        Self::Phone,
        Self::Description,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::CompanyName => 0,
            Self::AgentName => 1,
            Self::ServiceType => 2,
            Self::Email => 3,
            Self::Phone => 4,
            Self::Description => 5,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn is_last(self) -> bool {
        self.index() + 1 == TOTAL_STEPS
    }

    /// The single draft field this step collects.
    pub fn field(self) -> LeadField {
        match self {
            Self::CompanyName => LeadField::CompanyName,
            Self::AgentName => LeadField::AgentName,
            Self::ServiceType => LeadField::ServiceType,
            Self::Email => LeadField::Email,
            Self::Phone => LeadField::Phone,
            Self::Description => LeadField::Description,
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            Self::CompanyName => "What's your Business/ Company/ Your Name?",
            Self::AgentName => "AI Agent Name",
            Self::ServiceType => "What type of service do you need?",
            Self::Email => "What's your email address?",
            Self::Phone => "What's your phone number?",
            Self::Description => "Tell us about your requirements",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Buy,
    Support,
    Inquiries,
    Request,
}

impl ServiceType {
    pub const ALL: [ServiceType; 4] = [Self::Buy, Self::Support, Self::Inquiries, Self::Request];

    pub fn id(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Support => "support",
            Self::Inquiries => "inquiries",
            Self::Request => "request",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Support => "Support",
            Self::Inquiries => "Inquiries",
            Self::Request => "Request",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Buy => "Purchase products/services",
            Self::Support => "Technical assistance",
            Self::Inquiries => "General questions",
            Self::Request => "Custom quotes/special requests",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|service| service.id() == value.trim())
    }
}

/// Dialling codes offered by the phone step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountryCode {
    #[default]
    #[serde(rename = "+1")]
    UnitedStates,
    #[serde(rename = "+44")]
    UnitedKingdom,
    #[serde(rename = "+91")]
    India,
    #[serde(rename = "+86")]
    China,
    #[serde(rename = "+81")]
    Japan,
    #[serde(rename = "+49")]
    Germany,
    #[serde(rename = "+33")]
    France,
    #[serde(rename = "+61")]
    Australia,
    #[serde(rename = "+55")]
    Brazil,
    #[serde(rename = "+52")]
    Mexico,
}

impl CountryCode {
    pub const ALL: [CountryCode; 10] = [
        Self::UnitedStates,
        Self::UnitedKingdom,
        Self::India,
        Self::China,
        Self::Japan,
        Self::Germany,
        Self::France,
        Self::Australia,
        Self::Brazil,
        Self::Mexico,
    ];

    pub fn dial_code(self) -> &'static str {
        match self {
            Self::UnitedStates => "+1",
            Self::UnitedKingdom => "+44",
            Self::India => "+91",
            Self::China => "+86",
            Self::Japan => "+81",
            Self::Germany => "+49",
            Self::France => "+33",
            Self::Australia => "+61",
            Self::Brazil => "+55",
            Self::Mexico => "+52",
        }
    }

    pub fn flag(self) -> &'static str {
        match self {
            Self::UnitedStates => "🇺🇸",
            Self::UnitedKingdom => "🇬🇧",
            Self::India => "🇮🇳",
            Self::China => "🇨🇳",
            Self::Japan => "🇯🇵",
            Self::Germany => "🇩🇪",
            Self::France => "🇫🇷",
            Self::Australia => "🇦🇺",
            Self::Brazil => "🇧🇷",
            Self::Mexico => "🇲🇽",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.dial_code() == value.trim())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeadField {
    CompanyName,
    AgentName,
    ServiceType,
    Email,
    Phone,
    Description,
}

impl LeadField {
    pub fn key(self) -> &'static str {
        match self {
            Self::CompanyName => "companyName",
            Self::AgentName => "agentName",
            Self::ServiceType => "serviceType",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Description => "description",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeadEdit {
    CompanyName(String),
    AgentName(String),
    ServiceType(Option<ServiceType>),
    Email(String),
    CountryCode(CountryCode),
    /// Raw phone input; stored in display format.
    Phone(String),
    Description(String),
}

impl LeadEdit {
    /// Maps an HTML form field onto a typed edit. Unknown fields and
    /// unsupported dialling codes yield `None`.
    pub fn from_form_field(field: &str, value: &str) -> Option<Self> {
        match field {
            "companyName" => Some(Self::CompanyName(value.to_string())),
            "agentName" => Some(Self::AgentName(value.to_string())),
            "serviceType" => Some(Self::ServiceType(ServiceType::parse(value))),
            "email" => Some(Self::Email(value.to_string())),
            "countryCode" => CountryCode::parse(value).map(Self::CountryCode),
            "phone" => Some(Self::Phone(value.to_string())),
            "description" => Some(Self::Description(value.to_string())),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDraft {
    pub company_name: String,
    pub agent_name: String,
    pub service_type: Option<ServiceType>,
    pub email: String,
    pub country_code: CountryCode,
    pub phone: String,
    pub description: String,
}

impl LeadDraft {
    pub fn apply(&mut self, edit: LeadEdit) {
        match edit {
            LeadEdit::CompanyName(value) => self.company_name = value,
            LeadEdit::AgentName(value) => self.agent_name = value,
            LeadEdit::ServiceType(value) => self.service_type = value,
            LeadEdit::Email(value) => self.email = value,
            LeadEdit::CountryCode(value) => self.country_code = value,
            LeadEdit::Phone(value) => self.phone = format_phone(&value),
            LeadEdit::Description(value) => self.description = value,
        }
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Per-field validation messages from the latest attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(BTreeMap<LeadField, String>);

impl FieldErrors {
    pub fn single(field: LeadField, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.0.insert(field, message.into());
        errors
    }

    pub fn get(&self, field: LeadField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (LeadField, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardAction {
    /// Replay the invalid-input animation.
    ShakeForm,
    /// Deliver the draft to the lead sink.
    SubmitLead,
    NotifySubmitted,
    NotifySubmitFailed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardState {
    pub current_step: usize,
    pub direction: Direction,
    pub draft: LeadDraft,
    pub field_errors: FieldErrors,
    pub submitted: bool,
    pub submission_in_flight: bool,
}

impl WizardState {
    pub fn step(&self) -> WizardStep {
        WizardStep::from_index(self.current_step).unwrap_or(WizardStep::CompanyName)
    }

    pub fn progress_percent(&self) -> u32 {
        let percent = (self.current_step + 1) * 100 / TOTAL_STEPS;
        u32::try_from(percent).unwrap_or(100)
    }

    /// Rough minutes remaining at half a minute per question, rounded up.
    pub fn minutes_left(&self) -> usize {
        (TOTAL_STEPS - self.current_step.min(TOTAL_STEPS)).div_ceil(2)
    }

    pub fn question_label(&self) -> String {
        format!("Question {} → {}", self.current_step + 1, TOTAL_STEPS)
    }
}
