pub mod engine;
pub mod states;
pub mod validation;

pub use engine::{
    InMemoryLeadSink, LeadFormData, LeadSink, LeadSubmission, LeadWizard, RequestMeta,
    SubmissionMetadata, WizardError, WizardEvent, WizardOutcome,
};
pub use states::{
    CountryCode, Direction, FieldErrors, LeadDraft, LeadEdit, LeadField, ServiceType,
    WizardAction, WizardState, WizardStep, TOTAL_STEPS,
};
pub use validation::{format_phone, validate_step};
