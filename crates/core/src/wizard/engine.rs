use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::RemoteCallError;
use crate::wizard::states::{Direction, LeadEdit, WizardAction, WizardState, WizardStep};
use crate::wizard::validation::validate_step;

pub const LEAD_SOURCE: &str = "web_form";
pub const LEAD_FORM_VERSION: &str = "1.0";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WizardEvent {
    Next,
    Previous,
    SubmissionSucceeded,
    SubmissionFailed,
    Reset,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardOutcome {
    pub from: WizardStep,
    pub to: WizardStep,
    pub event: WizardEvent,
    pub actions: Vec<WizardAction>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("the lead has already been submitted")]
    AlreadySubmitted,
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("no submission is in flight")]
    NoSubmissionInFlight,
    #[error("the form can only be restarted after it has been submitted")]
    NotSubmitted,
}

/// Request details recorded alongside a lead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub user_agent: String,
    pub ip_address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadFormData {
    pub name: String,
    pub ai_agent_name: String,
    pub option_base: String,
    pub email: String,
    /// `<countryCode>-<display phone>`.
    pub phone: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    pub submitted_at: String,
    pub source: String,
    pub form_version: String,
    pub user_agent: String,
    pub ip_address: String,
}

/// Body of the lead webhook call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmission {
    pub form_data: LeadFormData,
    pub metadata: SubmissionMetadata,
}

#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn deliver(&self, submission: &LeadSubmission) -> Result<(), RemoteCallError>;
}

/// Step-by-step lead capture. Holds no I/O; delivery goes through a
/// [`LeadSink`] either via [`LeadWizard::next_and_submit`] or by the caller
/// acting on [`WizardAction::SubmitLead`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeadWizard {
    state: WizardState,
}

impl LeadWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn edit(&mut self, edit: LeadEdit) -> Result<(), WizardError> {
        self.ensure_open()?;
        self.state.draft.apply(edit);
        Ok(())
    }

    /// Validates the current step. Invalid input stays put and asks for a
    /// shake; valid input advances, or on the last step marks a submission in
    /// flight and asks the caller to deliver it.
    pub fn next(&mut self) -> Result<WizardOutcome, WizardError> {
        self.ensure_open()?;
        let from = self.state.step();
        let errors = validate_step(from, &self.state.draft);

        if !errors.is_empty() {
            self.state.field_errors = errors;
            return Ok(outcome(from, from, WizardEvent::Next, vec![WizardAction::ShakeForm]));
        }

        self.state.field_errors.clear();
        match from.next() {
            Some(to) => {
                self.state.direction = Direction::Forward;
                self.state.current_step = to.index();
                Ok(outcome(from, to, WizardEvent::Next, Vec::new()))
            }
            None => {
                self.state.submission_in_flight = true;
                Ok(outcome(from, from, WizardEvent::Next, vec![WizardAction::SubmitLead]))
            }
        }
    }

    /// Goes back one step without re-validating. A no-op on the first step.
    pub fn previous(&mut self) -> Result<WizardOutcome, WizardError> {
        self.ensure_open()?;
        let from = self.state.step();
        let Some(to) = from.previous() else {
            return Ok(outcome(from, from, WizardEvent::Previous, Vec::new()));
        };

        self.state.field_errors.clear();
        self.state.direction = Direction::Backward;
        self.state.current_step = to.index();
        Ok(outcome(from, to, WizardEvent::Previous, Vec::new()))
    }

    /// Payload for the current draft.
    pub fn submission(&self, meta: &RequestMeta, now: DateTime<Utc>) -> LeadSubmission {
        let draft = &self.state.draft;
        LeadSubmission {
            form_data: LeadFormData {
                name: draft.company_name.clone(),
                ai_agent_name: draft.agent_name.clone(),
                option_base: draft
                    .service_type
                    .map(|service| service.id().to_string())
                    .unwrap_or_default(),
                email: draft.email.clone(),
                phone: format!("{}-{}", draft.country_code.dial_code(), draft.phone),
                description: draft.description.clone(),
            },
            metadata: SubmissionMetadata {
                submitted_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
                source: LEAD_SOURCE.to_string(),
                form_version: LEAD_FORM_VERSION.to_string(),
                user_agent: meta.user_agent.clone(),
                ip_address: meta.ip_address.clone(),
            },
        }
    }

    /// Records the result of delivering an in-flight submission. Success is
    /// terminal; failure leaves the wizard on the last step for a retry.
    pub fn complete_submission(
        &mut self,
        result: Result<(), RemoteCallError>,
    ) -> Result<WizardOutcome, WizardError> {
        if !self.state.submission_in_flight {
            return Err(WizardError::NoSubmissionInFlight);
        }
        self.state.submission_in_flight = false;
        let step = self.state.step();

        match result {
            Ok(()) => {
                self.state.submitted = true;
                Ok(outcome(
                    step,
                    step,
                    WizardEvent::SubmissionSucceeded,
                    vec![WizardAction::NotifySubmitted],
                ))
            }
            Err(_) => Ok(outcome(
                step,
                step,
                WizardEvent::SubmissionFailed,
                vec![WizardAction::NotifySubmitFailed],
            )),
        }
    }

    /// `next()` followed, when it asks for one, by a single delivery through
    /// `sink`.
    pub async fn next_and_submit<S>(
        &mut self,
        sink: &S,
        meta: &RequestMeta,
    ) -> Result<WizardOutcome, WizardError>
    where
        S: LeadSink + ?Sized,
    {
        let advanced = self.next()?;
        if !advanced.actions.contains(&WizardAction::SubmitLead) {
            return Ok(advanced);
        }

        let submission = self.submission(meta, Utc::now());
        let result = sink.deliver(&submission).await;
        self.complete_submission(result)
    }

    /// Restarts a submitted form with an empty draft.
    pub fn reset(&mut self) -> Result<WizardOutcome, WizardError> {
        if !self.state.submitted {
            return Err(WizardError::NotSubmitted);
        }
        let from = self.state.step();
        self.state = WizardState::default();
        Ok(outcome(from, WizardStep::CompanyName, WizardEvent::Reset, Vec::new()))
    }

    fn ensure_open(&self) -> Result<(), WizardError> {
        if self.state.submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        if self.state.submission_in_flight {
            return Err(WizardError::SubmissionInFlight);
        }
        Ok(())
    }
}

fn outcome(
    from: WizardStep,
    to: WizardStep,
    event: WizardEvent,
    actions: Vec<WizardAction>,
) -> WizardOutcome {
    WizardOutcome { from, to, event, actions }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLeadSink {
    delivered: Arc<Mutex<Vec<LeadSubmission>>>,
    failure: Option<String>,
}

impl InMemoryLeadSink {
    /// A sink that records every call and then reports `message` as failure.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { delivered: Arc::default(), failure: Some(message.into()) }
    }

    pub fn delivered(&self) -> Vec<LeadSubmission> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LeadSink for InMemoryLeadSink {
    async fn deliver(&self, submission: &LeadSubmission) -> Result<(), RemoteCallError> {
        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(submission.clone()),
            Err(poisoned) => poisoned.into_inner().push(submission.clone()),
        }
        match &self.failure {
            Some(message) => Err(RemoteCallError::new("lead.deliver", message.clone())),
            None => Ok(()),
        }
    }
}
