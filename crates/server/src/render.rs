use std::sync::Arc;

use agentmart_core::auth::Viewer;
use agentmart_core::errors::{ApplicationError, InterfaceError};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::error;

use crate::state::AppState;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../../templates/site/base.html")),
    ("home.html", include_str!("../../../templates/site/home.html")),
    ("catalog.html", include_str!("../../../templates/site/catalog.html")),
    ("catalog_grid.html", include_str!("../../../templates/site/catalog_grid.html")),
    ("agent_detail.html", include_str!("../../../templates/site/agent_detail.html")),
    ("request.html", include_str!("../../../templates/site/request.html")),
    ("not_found.html", include_str!("../../../templates/site/not_found.html")),
    ("error.html", include_str!("../../../templates/site/error.html")),
    ("admin/login.html", include_str!("../../../templates/site/admin/login.html")),
    ("admin/dashboard.html", include_str!("../../../templates/site/admin/dashboard.html")),
    ("admin/agents.html", include_str!("../../../templates/site/admin/agents.html")),
    ("admin/agent_form.html", include_str!("../../../templates/site/admin/agent_form.html")),
    ("admin/agent_delete.html", include_str!("../../../templates/site/admin/agent_delete.html")),
    ("admin/key_features.html", include_str!("../../../templates/site/admin/key_features.html")),
    (
        "admin/key_feature_form.html",
        include_str!("../../../templates/site/admin/key_feature_form.html"),
    ),
    ("admin/description.html", include_str!("../../../templates/site/admin/description.html")),
    (
        "admin/features_editor.html",
        include_str!("../../../templates/site/admin/features_editor.html"),
    ),
    (
        "admin/comparison_editor.html",
        include_str!("../../../templates/site/admin/comparison_editor.html"),
    ),
];

/// Parses the embedded page templates.
pub fn init_templates() -> Result<Arc<Tera>, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES.iter().copied())?;
    Ok(Arc::new(tera))
}

pub fn render(templates: &Tera, name: &str, context: &Context) -> Response {
    render_with_status(StatusCode::OK, templates, name, context)
}

pub fn render_with_status(
    status: StatusCode,
    templates: &Tera,
    name: &str,
    context: &Context,
) -> Response {
    match templates.render(name, context) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(error) => {
            error!(
                event_name = "site.render.failed",
                template = name,
                error = ?error,
                "template rendering failed"
            );
            let internal = InterfaceError::Internal {
                message: error.to_string(),
                correlation_id: "render".to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Html(internal.user_message().to_string()))
                .into_response()
        }
    }
}

/// Shared context for every page: brand, viewer flags and the flash notice.
pub fn page_context(state: &AppState, viewer: &Viewer, notice: Option<Notice>) -> Context {
    let mut context = Context::new();
    context.insert("brand_name", &state.settings.brand_name);
    context.insert("signed_in", &viewer.session.is_some());
    context.insert("is_admin", &viewer.is_admin);
    context.insert("notice", &notice.map(NoticeView::from));
    context
}

/// A failed request, rendered as the error page with a user-safe message.
#[derive(Debug)]
pub struct PageError {
    templates: Arc<Tera>,
    error: ApplicationError,
}

impl PageError {
    pub fn new(templates: Arc<Tera>, error: ApplicationError) -> Self {
        Self { templates, error }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let interface = self.error.into_interface(correlation_id.clone());
        let status = match &interface {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(
            event_name = "site.request.failed",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            error = %interface,
            "request failed"
        );

        let mut context = Context::new();
        context.insert("message", interface.user_message());
        context.insert("correlation_id", interface.correlation_id());
        render_with_status(status, &self.templates, "error.html", &context)
    }
}

/// One-shot message carried across a redirect as `?notice=<code>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    AccessDenied,
    SignedOut,
    AgentCreated,
    AgentUpdated,
    AgentDeleted,
    FeatureCreated,
    FeatureUpdated,
    FeatureDeleted,
    FeatureMoved,
    DescriptionUpdated,
    FeaturesUpdated,
    ComparisonUpdated,
    ComparisonEnabled,
    ComparisonDisabled,
}

impl Notice {
    const ALL: [Notice; 14] = [
        Self::AccessDenied,
        Self::SignedOut,
        Self::AgentCreated,
        Self::AgentUpdated,
        Self::AgentDeleted,
        Self::FeatureCreated,
        Self::FeatureUpdated,
        Self::FeatureDeleted,
        Self::FeatureMoved,
        Self::DescriptionUpdated,
        Self::FeaturesUpdated,
        Self::ComparisonUpdated,
        Self::ComparisonEnabled,
        Self::ComparisonDisabled,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::AccessDenied => "access-denied",
            Self::SignedOut => "signed-out",
            Self::AgentCreated => "agent-created",
            Self::AgentUpdated => "agent-updated",
            Self::AgentDeleted => "agent-deleted",
            Self::FeatureCreated => "feature-created",
            Self::FeatureUpdated => "feature-updated",
            Self::FeatureDeleted => "feature-deleted",
            Self::FeatureMoved => "feature-moved",
            Self::DescriptionUpdated => "description-updated",
            Self::FeaturesUpdated => "features-updated",
            Self::ComparisonUpdated => "comparison-updated",
            Self::ComparisonEnabled => "comparison-enabled",
            Self::ComparisonDisabled => "comparison-disabled",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::AccessDenied => "Access denied. Admin privileges required.",
            Self::SignedOut => "You have been signed out.",
            Self::AgentCreated => "Agent created successfully",
            Self::AgentUpdated => "Agent updated successfully",
            Self::AgentDeleted => "Agent deleted successfully",
            Self::FeatureCreated => "Feature created successfully",
            Self::FeatureUpdated => "Feature updated successfully",
            Self::FeatureDeleted => "Feature deleted successfully",
            Self::FeatureMoved => "Feature order updated",
            Self::DescriptionUpdated => "Description updated successfully",
            Self::FeaturesUpdated => "Features updated successfully",
            Self::ComparisonUpdated => "Comparison table updated successfully",
            Self::ComparisonEnabled => "Comparison table enabled",
            Self::ComparisonDisabled => "Comparison table disabled",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::AccessDenied)
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|notice| notice.code() == code)
    }

    pub fn redirect(self, path: &str) -> Redirect {
        let separator = if path.contains('?') { '&' } else { '?' };
        Redirect::to(&format!("{path}{separator}notice={}", self.code()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

impl NoticeQuery {
    pub fn notice(&self) -> Option<Notice> {
        self.notice.as_deref().and_then(Notice::parse)
    }
}

#[derive(Debug, Serialize)]
struct NoticeView {
    kind: &'static str,
    message: &'static str,
}

impl From<Notice> for NoticeView {
    fn from(notice: Notice) -> Self {
        Self { kind: if notice.is_error() { "error" } else { "success" }, message: notice.message() }
    }
}

/// An inline message that is not carried across a redirect.
pub fn inline_notice(context: &mut Context, kind: &'static str, message: impl Into<String>) {
    context.insert(
        "notice",
        &serde_json::json!({ "kind": kind, "message": message.into() }),
    );
}
