use std::sync::Arc;

use agentmart_core::config::AppConfig;
use agentmart_core::domain::comparison::ComparisonRow;
use agentmart_core::domain::feature::Feature;
use agentmart_core::errors::ApplicationError;
use agentmart_core::ordered::OrderedList;
use agentmart_core::wizard::LeadSink;
use agentmart_db::repositories::{
    AgentRepository, AuthRepository, KeyFeatureRepository, RepositoryError, SqlAgentRepository,
    SqlAuthRepository, SqlKeyFeatureRepository,
};
use agentmart_db::ChangeBus;
use chrono::Duration;
use tera::Tera;

use crate::bootstrap::Application;
use crate::drafts::DraftStore;
use crate::render::PageError;
use crate::wizard_sessions::WizardSessions;

/// Settings the request handlers read.
#[derive(Clone, Debug)]
pub struct SiteSettings {
    pub brand_name: String,
    pub session_ttl_hours: u32,
    pub cookie_secure: bool,
}

impl SiteSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            brand_name: config.site.brand_name.clone(),
            session_ttl_hours: config.auth.session_ttl_hours,
            cookie_secure: config.auth.cookie_secure,
        }
    }
}

/// Comparison editor draft: the rows being edited plus the headers they will
/// be saved under.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComparisonDraft {
    pub headers: Vec<String>,
    pub rows: OrderedList<ComparisonRow>,
}

#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<dyn AgentRepository>,
    pub key_features: Arc<dyn KeyFeatureRepository>,
    pub auth: Arc<dyn AuthRepository>,
    pub changes: ChangeBus,
    pub lead_sink: Arc<dyn LeadSink>,
    pub templates: Arc<Tera>,
    pub settings: Arc<SiteSettings>,
    pub feature_drafts: Arc<DraftStore<OrderedList<Feature>>>,
    pub comparison_drafts: Arc<DraftStore<ComparisonDraft>>,
    pub wizards: Arc<WizardSessions>,
}

impl AppState {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        key_features: Arc<dyn KeyFeatureRepository>,
        auth: Arc<dyn AuthRepository>,
        changes: ChangeBus,
        lead_sink: Arc<dyn LeadSink>,
        templates: Arc<Tera>,
        settings: SiteSettings,
    ) -> Self {
        let draft_ttl = Duration::hours(i64::from(settings.session_ttl_hours));
        Self {
            agents,
            key_features,
            auth,
            changes,
            lead_sink,
            templates,
            feature_drafts: Arc::new(DraftStore::with_idle_ttl(draft_ttl)),
            comparison_drafts: Arc::new(DraftStore::with_idle_ttl(draft_ttl)),
            wizards: Arc::default(),
            settings: Arc::new(settings),
        }
    }

    /// SQL-backed state for a bootstrapped application.
    pub fn from_application(app: &Application, templates: Arc<Tera>) -> Self {
        let pool = app.db_pool.clone();
        Self::new(
            Arc::new(SqlAgentRepository::new(pool.clone(), app.changes.clone())),
            Arc::new(SqlKeyFeatureRepository::new(pool.clone(), app.changes.clone())),
            Arc::new(SqlAuthRepository::new(pool)),
            app.changes.clone(),
            Arc::new(app.lead_sink.clone()),
            templates,
            SiteSettings::from_config(&app.config),
        )
    }

    pub fn fail(&self, error: impl Into<ApplicationError>) -> PageError {
        PageError::new(self.templates.clone(), error.into())
    }

    pub fn storage_failure(&self, error: RepositoryError) -> PageError {
        self.fail(ApplicationError::Persistence(error.to_string()))
    }
}
