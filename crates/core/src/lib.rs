pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ordered;
pub mod wizard;

pub use auth::{AccessDenied, Role, Session, UserId, Viewer};
pub use domain::agent::{Agent, AgentForm, AgentId, AgentPatch, PlanTier, Pricing, TierPlan};
pub use domain::comparison::{ComparisonRow, ComparisonRowEdit, ComparisonRowKind, ComparisonTable};
pub use domain::feature::{Feature, FeatureEdit, FeatureKind};
pub use domain::key_feature::{KeyFeature, KeyFeatureForm, KeyFeatureKind};
pub use errors::{ApplicationError, DomainError, InterfaceError, RemoteCallError};
pub use ordered::{CollectionStore, ItemId, MoveDirection, OrderedItem, OrderedList, SaveError};
pub use wizard::{LeadSink, LeadSubmission, LeadWizard, RequestMeta, WizardAction, WizardError};
