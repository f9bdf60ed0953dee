//! Admin console. Every handler except the login pair passes through
//! [`require_admin`] before touching storage.
//!
//! List editors (feature cards, comparison rows) keep an [`OrderedList`]
//! draft per session and agent; nothing reaches storage until `save`.

use std::str::FromStr;

use agentmart_core::auth::Viewer;
use agentmart_core::domain::agent::{Agent, AgentForm, AgentId, AgentPatch};
use agentmart_core::domain::comparison::{
    ComparisonRow, ComparisonRowEdit, ComparisonRowKind, PLAN_VALUE_COUNT,
};
use agentmart_core::domain::feature::{Feature, FeatureEdit, FeatureKind};
use agentmart_core::domain::key_feature::{KeyFeature, KeyFeatureForm, KeyFeatureKind};
use agentmart_core::errors::DomainError;
use agentmart_core::ordered::{ItemId, MoveDirection, OrderedItem, OrderedList, SaveError};
use agentmart_db::repositories::{AgentComparisonStore, AgentFeatureStore, KeyFeatureOrderStore};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tera::Context;
use tracing::{info, warn};

use crate::drafts::DraftKey;
use crate::render::{inline_notice, page_context, render, render_with_status, Notice, NoticeQuery, PageError};
use crate::site::not_found_page;
use crate::state::{AppState, ComparisonDraft};
use crate::viewer::{
    cookie_value, expired_cookie, require_admin, resolve_viewer, set_cookie, AdminContext,
    SESSION_COOKIE,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/admin", get(|| async { Redirect::to("/admin/dashboard") }))
        .route("/admin/login", get(login_form).post(login))
        .route("/admin/logout", post(logout))
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/agents", get(agents).post(create_agent))
        .route("/admin/agents/new", get(new_agent))
        .route("/admin/agents/{id}", post(update_agent))
        .route("/admin/agents/{id}/edit", get(edit_agent))
        .route("/admin/agents/{id}/delete", get(confirm_delete_agent).post(delete_agent))
        .route("/admin/agents/{id}/description", get(description_form).post(save_description))
        .route("/admin/agents/{id}/comparison/toggle", post(toggle_comparison))
        .route("/admin/agents/{id}/features", get(features_editor))
        .route("/admin/agents/{id}/features/add", post(add_feature_card))
        .route("/admin/agents/{id}/features/save", post(save_feature_cards))
        .route("/admin/agents/{id}/features/discard", post(discard_feature_cards))
        .route("/admin/agents/{id}/features/{item}/update", post(update_feature_card))
        .route("/admin/agents/{id}/features/{item}/move", post(move_feature_card))
        .route("/admin/agents/{id}/features/{item}/delete", post(delete_feature_card))
        .route("/admin/agents/{id}/comparison", get(comparison_editor))
        .route("/admin/agents/{id}/comparison/add", post(add_comparison_row))
        .route("/admin/agents/{id}/comparison/save", post(save_comparison_rows))
        .route("/admin/agents/{id}/comparison/discard", post(discard_comparison_rows))
        .route("/admin/agents/{id}/comparison/{item}/update", post(update_comparison_row))
        .route("/admin/agents/{id}/comparison/{item}/move", post(move_comparison_row))
        .route("/admin/agents/{id}/comparison/{item}/delete", post(delete_comparison_row))
        .route("/admin/key-features", get(key_features).post(create_key_feature))
        .route("/admin/key-features/new", get(new_key_feature))
        .route("/admin/key-features/{id}", post(update_key_feature))
        .route("/admin/key-features/{id}/edit", get(edit_key_feature))
        .route("/admin/key-features/{id}/delete", post(delete_key_feature))
        .route("/admin/key-features/{id}/move", post(move_key_feature))
        .with_state(state)
}

/// Why an admin request ended early: the gate redirected, or a storage call
/// failed.
pub enum AdminError {
    Gate(Redirect),
    Page(PageError),
}

impl From<Redirect> for AdminError {
    fn from(redirect: Redirect) -> Self {
        Self::Gate(redirect)
    }
}

impl From<PageError> for AdminError {
    fn from(error: PageError) -> Self {
        Self::Page(error)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            Self::Gate(redirect) => redirect.into_response(),
            Self::Page(error) => error.into_response(),
        }
    }
}

type AdminResult = Result<Response, AdminError>;

fn field_message(error: &DomainError) -> String {
    match error {
        DomainError::InvalidField { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

async fn load_agent(state: &AppState, id: &AgentId) -> Result<Option<Agent>, AdminError> {
    Ok(state.agents.find_by_id(id).await.map_err(|e| state.storage_failure(e))?)
}

#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login_form(
    State(state): State<AppState>,
    Query(query): Query<NoticeQuery>,
    headers: HeaderMap,
) -> Response {
    let viewer = resolve_viewer(&state, &headers).await;
    if viewer.is_admin {
        return Redirect::to("/admin/dashboard").into_response();
    }
    let mut context = page_context(&state, &viewer, query.notice());
    context.insert("email", "");
    render(&state.templates, "admin/login.html", &context)
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> AdminResult {
    let settings = &state.settings;
    let session = state
        .auth
        .sign_in(form.email.trim(), &form.password, Utc::now(), settings.session_ttl_hours)
        .await
        .map_err(|e| state.storage_failure(e))?;

    let Some(session) = session else {
        info!(event_name = "admin.login.rejected", "sign-in rejected");
        let viewer = resolve_viewer(&state, &headers).await;
        let mut context = page_context(&state, &viewer, None);
        context.insert("email", form.email.trim());
        inline_notice(&mut context, "error", "Invalid email or password");
        return Ok(render_with_status(
            StatusCode::UNAUTHORIZED,
            &state.templates,
            "admin/login.html",
            &context,
        ));
    };

    info!(event_name = "admin.login.succeeded", email = %session.email, "admin signed in");
    let max_age = i64::from(settings.session_ttl_hours) * 3600;
    let cookie = set_cookie(SESSION_COOKIE, &session.token, max_age, settings.cookie_secure);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/admin/dashboard")).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AdminResult {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        state.auth.sign_out(&token).await.map_err(|e| state.storage_failure(e))?;
        state.feature_drafts.discard_session(&token).await;
        state.comparison_drafts.discard_session(&token).await;
        info!(event_name = "admin.logout", "session signed out");
    }
    let cookie = expired_cookie(SESSION_COOKIE);
    Ok(([(header::SET_COOKIE, cookie)], Notice::SignedOut.redirect("/")).into_response())
}

async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<NoticeQuery>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_count = state.agents.count().await.map_err(|e| state.storage_failure(e))?;
    let key_feature_count =
        state.key_features.list_all().await.map_err(|e| state.storage_failure(e))?.len();

    let mut context = page_context(&state, &admin.viewer, query.notice());
    context.insert("email", &admin.session.email);
    context.insert("agent_count", &agent_count);
    context.insert("key_feature_count", &key_feature_count);
    Ok(render(&state.templates, "admin/dashboard.html", &context))
}

async fn agents(
    State(state): State<AppState>,
    Query(query): Query<NoticeQuery>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agents = state.agents.list_all().await.map_err(|e| state.storage_failure(e))?;

    let mut context = page_context(&state, &admin.viewer, query.notice());
    context.insert("agents", &agents);
    Ok(render(&state.templates, "admin/agents.html", &context))
}

fn agent_form_page(
    state: &AppState,
    viewer: &Viewer,
    agent_id: Option<&AgentId>,
    form: &AgentForm,
    error: Option<String>,
) -> Response {
    let mut context = page_context(state, viewer, None);
    context.insert("agent_id", &agent_id.map(AgentId::as_str));
    context.insert("form", form);
    let status = match error {
        Some(message) => {
            inline_notice(&mut context, "error", message);
            StatusCode::UNPROCESSABLE_ENTITY
        }
        None => StatusCode::OK,
    };
    render_with_status(status, &state.templates, "admin/agent_form.html", &context)
}

async fn new_agent(State(state): State<AppState>, headers: HeaderMap) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    Ok(agent_form_page(&state, &admin.viewer, None, &AgentForm::for_new_agent(), None))
}

async fn create_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AgentForm>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let fields = match form.parse() {
        Ok(fields) => fields,
        Err(error) => {
            let message = field_message(&error);
            return Ok(agent_form_page(&state, &admin.viewer, None, &form, Some(message)));
        }
    };

    let agent = Agent::create(AgentId::generate(), fields, Utc::now());
    let agent_id = agent.id.clone();
    state.agents.insert(agent).await.map_err(|e| state.storage_failure(e))?;
    info!(event_name = "admin.agent.created", agent_id = %agent_id, "agent created");
    Ok(Notice::AgentCreated.redirect("/admin/agents").into_response())
}

async fn edit_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let Some(agent) = load_agent(&state, &agent_id).await? else {
        return Ok(not_found_page(&state, &admin.viewer));
    };
    Ok(agent_form_page(&state, &admin.viewer, Some(&agent_id), &AgentForm::from_agent(&agent), None))
}

async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<AgentForm>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let Some(mut agent) = load_agent(&state, &agent_id).await? else {
        return Ok(not_found_page(&state, &admin.viewer));
    };
    let fields = match form.parse() {
        Ok(fields) => fields,
        Err(error) => {
            let message = field_message(&error);
            return Ok(agent_form_page(&state, &admin.viewer, Some(&agent_id), &form, Some(message)));
        }
    };

    agent.apply_fields(fields);
    let updated = state.agents.update(agent).await.map_err(|e| state.storage_failure(e))?;
    if !updated {
        return Ok(not_found_page(&state, &admin.viewer));
    }
    info!(event_name = "admin.agent.updated", agent_id = %agent_id, "agent updated");
    Ok(Notice::AgentUpdated.redirect("/admin/agents").into_response())
}

async fn confirm_delete_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let Some(agent) = load_agent(&state, &AgentId(id)).await? else {
        return Ok(not_found_page(&state, &admin.viewer));
    };
    let mut context = page_context(&state, &admin.viewer, None);
    context.insert("agent", &agent);
    Ok(render(&state.templates, "admin/agent_delete.html", &context))
}

async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let deleted = state.agents.delete(&agent_id).await.map_err(|e| state.storage_failure(e))?;
    if !deleted {
        return Ok(not_found_page(&state, &admin.viewer));
    }
    let key = DraftKey::new(&admin.session.token, &agent_id);
    state.feature_drafts.discard(&key).await;
    state.comparison_drafts.discard(&key).await;
    info!(event_name = "admin.agent.deleted", agent_id = %agent_id, "agent deleted");
    Ok(Notice::AgentDeleted.redirect("/admin/agents").into_response())
}

#[derive(Debug, Default, Deserialize)]
struct DescriptionForm {
    #[serde(default)]
    description: String,
}

async fn description_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let Some(agent) = load_agent(&state, &AgentId(id)).await? else {
        return Ok(not_found_page(&state, &admin.viewer));
    };
    let mut context = page_context(&state, &admin.viewer, None);
    context.insert("agent", &agent);
    Ok(render(&state.templates, "admin/description.html", &context))
}

async fn save_description(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<DescriptionForm>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let patch = AgentPatch::Description(form.description.trim().to_string());
    let updated =
        state.agents.apply_patch(&agent_id, patch).await.map_err(|e| state.storage_failure(e))?;
    if !updated {
        return Ok(not_found_page(&state, &admin.viewer));
    }
    Ok(Notice::DescriptionUpdated.redirect(&format!("/agent/{agent_id}")).into_response())
}

async fn toggle_comparison(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let Some(agent) = load_agent(&state, &agent_id).await? else {
        return Ok(not_found_page(&state, &admin.viewer));
    };

    let enabled = !agent.comparison_enabled;
    let updated = state
        .agents
        .apply_patch(&agent_id, AgentPatch::ComparisonEnabled(enabled))
        .await
        .map_err(|e| state.storage_failure(e))?;
    if !updated {
        return Ok(not_found_page(&state, &admin.viewer));
    }
    let notice = if enabled { Notice::ComparisonEnabled } else { Notice::ComparisonDisabled };
    Ok(notice.redirect(&format!("/agent/{agent_id}")).into_response())
}

#[derive(Debug, Deserialize)]
struct MoveForm {
    direction: String,
}

impl MoveForm {
    fn direction(&self) -> Option<MoveDirection> {
        MoveDirection::from_str(&self.direction).ok()
    }
}

/// Collects typed edits from posted fields. An unchecked checkbox is absent
/// from the form, so `visible` is derived from presence.
fn feature_edits(fields: &[(String, String)]) -> Vec<FeatureEdit> {
    let mut edits: Vec<FeatureEdit> = fields
        .iter()
        .filter(|(name, _)| name != "visible")
        .filter_map(|(name, value)| FeatureEdit::from_form_field(name, value))
        .collect();
    edits.push(FeatureEdit::Visible(fields.iter().any(|(name, _)| name == "visible")));
    edits
}

fn editor_path(agent_id: &AgentId, editor: &str) -> String {
    format!("/admin/agents/{agent_id}/{editor}")
}

fn save_error_notice(error: &SaveError, what: &str) -> (StatusCode, String) {
    match error {
        SaveError::Validation(invalid) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Item {}: {}", invalid.position + 1, invalid.message),
        ),
        SaveError::Remote(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, format!("Failed to save {what}. Please try again."))
        }
    }
}

fn features_page(
    state: &AppState,
    admin: &AdminContext,
    agent: &Agent,
    draft: &OrderedList<Feature>,
    failure: Option<(StatusCode, String)>,
) -> Response {
    let mut context = page_context(state, &admin.viewer, None);
    context.insert("agent", agent);
    context.insert("items", draft.items());
    let status = match failure {
        Some((status, message)) => {
            inline_notice(&mut context, "error", message);
            status
        }
        None => StatusCode::OK,
    };
    render_with_status(status, &state.templates, "admin/features_editor.html", &context)
}

async fn features_editor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let Some(agent) = load_agent(&state, &agent_id).await? else {
        return Ok(not_found_page(&state, &admin.viewer));
    };

    let key = DraftKey::new(&admin.session.token, &agent_id);
    let draft =
        state.feature_drafts.open(key, OrderedList::from_persisted(agent.features.clone())).await;
    Ok(features_page(&state, &admin, &agent, &draft, None))
}

async fn add_feature_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    state.feature_drafts.update(&key, |draft| draft.add(FeatureKind::Card).id().clone()).await;
    Ok(Redirect::to(&editor_path(&agent_id, "features")).into_response())
}

async fn update_feature_card(
    State(state): State<AppState>,
    Path((id, item)): Path<(String, String)>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let item = ItemId(item);
    let edits = feature_edits(&fields);
    state
        .feature_drafts
        .update(&key, |draft| {
            for edit in edits {
                draft.update(&item, edit);
            }
        })
        .await;
    Ok(Redirect::to(&editor_path(&agent_id, "features")).into_response())
}

async fn move_feature_card(
    State(state): State<AppState>,
    Path((id, item)): Path<(String, String)>,
    headers: HeaderMap,
    Form(form): Form<MoveForm>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let item = ItemId(item);
    if let Some(direction) = form.direction() {
        state
            .feature_drafts
            .update(&key, |draft| {
                draft.position(&item).is_some_and(|index| draft.reorder(index, direction))
            })
            .await;
    }
    Ok(Redirect::to(&editor_path(&agent_id, "features")).into_response())
}

async fn delete_feature_card(
    State(state): State<AppState>,
    Path((id, item)): Path<(String, String)>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let item = ItemId(item);
    state.feature_drafts.update(&key, |draft| draft.delete(&item)).await;
    Ok(Redirect::to(&editor_path(&agent_id, "features")).into_response())
}

async fn save_feature_cards(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let Some(draft) = state.feature_drafts.get(&key).await else {
        return Ok(Redirect::to(&editor_path(&agent_id, "features")).into_response());
    };

    let store = AgentFeatureStore::new(&*state.agents, agent_id.clone());
    match draft.save(&store).await {
        Ok(()) => {
            state.feature_drafts.discard(&key).await;
            info!(
                event_name = "admin.features.saved",
                agent_id = %agent_id,
                count = draft.len(),
                "feature cards saved"
            );
            Ok(Notice::FeaturesUpdated.redirect(&format!("/agent/{agent_id}")).into_response())
        }
        Err(error) => {
            warn!(event_name = "admin.features.save_failed", agent_id = %agent_id, error = %error, "feature cards not saved");
            let Some(agent) = load_agent(&state, &agent_id).await? else {
                state.feature_drafts.discard(&key).await;
                return Ok(not_found_page(&state, &admin.viewer));
            };
            let failure = save_error_notice(&error, "features");
            Ok(features_page(&state, &admin, &agent, &draft, Some(failure)))
        }
    }
}

async fn discard_feature_cards(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    state.feature_drafts.discard(&DraftKey::new(&admin.session.token, &agent_id)).await;
    Ok(Redirect::to(&format!("/agent/{agent_id}")).into_response())
}

#[derive(Debug, Serialize)]
struct ComparisonRowForm<'a> {
    id: &'a str,
    kind: &'static str,
    label: &'a str,
    values: Vec<&'a str>,
}

impl<'a> From<&'a ComparisonRow> for ComparisonRowForm<'a> {
    fn from(row: &'a ComparisonRow) -> Self {
        let values = (0..PLAN_VALUE_COUNT)
            .map(|index| row.values.get(index).map(String::as_str).unwrap_or(""))
            .collect();
        Self { id: row.id.as_str(), kind: row.kind.as_str(), label: &row.label, values }
    }
}

fn comparison_page(
    state: &AppState,
    admin: &AdminContext,
    agent: &Agent,
    draft: &ComparisonDraft,
    failure: Option<(StatusCode, String)>,
) -> Response {
    let rows: Vec<ComparisonRowForm<'_>> = draft.rows.items().iter().map(Into::into).collect();
    let mut context = page_context(state, &admin.viewer, None);
    context.insert("agent", agent);
    context.insert("headers", &draft.headers);
    context.insert("rows", &rows);
    let status = match failure {
        Some((status, message)) => {
            inline_notice(&mut context, "error", message);
            status
        }
        None => StatusCode::OK,
    };
    render_with_status(status, &state.templates, "admin/comparison_editor.html", &context)
}

async fn comparison_editor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let Some(agent) = load_agent(&state, &agent_id).await? else {
        return Ok(not_found_page(&state, &admin.viewer));
    };

    let fresh = ComparisonDraft {
        headers: agent.comparison_table.effective_headers(),
        rows: OrderedList::from_persisted(agent.comparison_table.rows.clone()),
    };
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let draft = state.comparison_drafts.open(key, fresh).await;
    Ok(comparison_page(&state, &admin, &agent, &draft, None))
}

#[derive(Debug, Deserialize)]
struct AddRowForm {
    #[serde(default)]
    kind: String,
}

async fn add_comparison_row(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<AddRowForm>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let kind = ComparisonRowKind::parse(&form.kind).unwrap_or(ComparisonRowKind::Feature);
    state.comparison_drafts.update(&key, |draft| draft.rows.add(kind).id().clone()).await;
    Ok(Redirect::to(&editor_path(&agent_id, "comparison")).into_response())
}

async fn update_comparison_row(
    State(state): State<AppState>,
    Path((id, item)): Path<(String, String)>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let item = ItemId(item);
    let edits: Vec<ComparisonRowEdit> = fields
        .iter()
        .filter_map(|(name, value)| ComparisonRowEdit::from_form_field(name, value))
        .collect();
    state
        .comparison_drafts
        .update(&key, |draft| {
            for edit in edits {
                draft.rows.update(&item, edit);
            }
        })
        .await;
    Ok(Redirect::to(&editor_path(&agent_id, "comparison")).into_response())
}

async fn move_comparison_row(
    State(state): State<AppState>,
    Path((id, item)): Path<(String, String)>,
    headers: HeaderMap,
    Form(form): Form<MoveForm>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let item = ItemId(item);
    if let Some(direction) = form.direction() {
        state
            .comparison_drafts
            .update(&key, |draft| {
                draft.rows.position(&item).is_some_and(|index| draft.rows.reorder(index, direction))
            })
            .await;
    }
    Ok(Redirect::to(&editor_path(&agent_id, "comparison")).into_response())
}

async fn delete_comparison_row(
    State(state): State<AppState>,
    Path((id, item)): Path<(String, String)>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let item = ItemId(item);
    state.comparison_drafts.update(&key, |draft| draft.rows.delete(&item)).await;
    Ok(Redirect::to(&editor_path(&agent_id, "comparison")).into_response())
}

/// Header cells arrive as `header_0`..`header_4`; blanks keep the old text.
fn apply_headers(headers: &mut Vec<String>, fields: &[(String, String)]) {
    for (name, value) in fields {
        let Some(index) = name.strip_prefix("header_").and_then(|i| i.parse::<usize>().ok()) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if let Some(cell) = headers.get_mut(index) {
            *cell = value.to_string();
        }
    }
}

async fn save_comparison_rows(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    let key = DraftKey::new(&admin.session.token, &agent_id);
    let Some(draft) = state
        .comparison_drafts
        .update(&key, |draft| {
            apply_headers(&mut draft.headers, &fields);
            draft.clone()
        })
        .await
    else {
        return Ok(Redirect::to(&editor_path(&agent_id, "comparison")).into_response());
    };

    let store = AgentComparisonStore::new(&*state.agents, agent_id.clone(), draft.headers.clone());
    match draft.rows.save(&store).await {
        Ok(()) => {
            state.comparison_drafts.discard(&key).await;
            info!(
                event_name = "admin.comparison.saved",
                agent_id = %agent_id,
                rows = draft.rows.len(),
                "comparison table saved"
            );
            Ok(Notice::ComparisonUpdated.redirect(&format!("/agent/{agent_id}")).into_response())
        }
        Err(error) => {
            warn!(event_name = "admin.comparison.save_failed", agent_id = %agent_id, error = %error, "comparison table not saved");
            let Some(agent) = load_agent(&state, &agent_id).await? else {
                state.comparison_drafts.discard(&key).await;
                return Ok(not_found_page(&state, &admin.viewer));
            };
            let failure = save_error_notice(&error, "comparison table");
            Ok(comparison_page(&state, &admin, &agent, &draft, Some(failure)))
        }
    }
}

async fn discard_comparison_rows(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let agent_id = AgentId(id);
    state.comparison_drafts.discard(&DraftKey::new(&admin.session.token, &agent_id)).await;
    Ok(Redirect::to(&format!("/agent/{agent_id}")).into_response())
}

async fn key_features(
    State(state): State<AppState>,
    Query(query): Query<NoticeQuery>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let features = state.key_features.list_all().await.map_err(|e| state.storage_failure(e))?;
    let ordered = OrderedList::from_persisted(features);

    let mut context = page_context(&state, &admin.viewer, query.notice());
    context.insert("features", ordered.items());
    Ok(render(&state.templates, "admin/key_features.html", &context))
}

fn key_feature_form_page(
    state: &AppState,
    viewer: &Viewer,
    feature_id: Option<&ItemId>,
    form: &KeyFeatureForm,
    error: Option<String>,
) -> Response {
    let mut context = page_context(state, viewer, None);
    context.insert("feature_id", &feature_id.map(ItemId::as_str));
    context.insert("form", form);
    let status = match error {
        Some(message) => {
            inline_notice(&mut context, "error", message);
            StatusCode::UNPROCESSABLE_ENTITY
        }
        None => StatusCode::OK,
    };
    render_with_status(status, &state.templates, "admin/key_feature_form.html", &context)
}

async fn new_key_feature(State(state): State<AppState>, headers: HeaderMap) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    Ok(key_feature_form_page(&state, &admin.viewer, None, &KeyFeatureForm::for_new_feature(), None))
}

async fn create_key_feature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<KeyFeatureForm>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let existing = state.key_features.list_all().await.map_err(|e| state.storage_failure(e))?;
    let display_order = u32::try_from(existing.len() + 1).unwrap_or(u32::MAX);

    let id = ItemId(uuid::Uuid::new_v4().to_string());
    let mut feature = KeyFeature::with_defaults(id, KeyFeatureKind::Standard, display_order);
    if let Err(error) = form.apply_to(&mut feature) {
        let message = field_message(&error);
        return Ok(key_feature_form_page(&state, &admin.viewer, None, &form, Some(message)));
    }

    let feature_id = feature.id.clone();
    state.key_features.insert(feature).await.map_err(|e| state.storage_failure(e))?;
    info!(event_name = "admin.key_feature.created", feature_id = %feature_id, display_order, "key feature created");
    Ok(Notice::FeatureCreated.redirect("/admin/key-features").into_response())
}

async fn edit_key_feature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let feature_id = ItemId(id);
    let feature =
        state.key_features.find_by_id(&feature_id).await.map_err(|e| state.storage_failure(e))?;
    let Some(feature) = feature else {
        return Ok(not_found_page(&state, &admin.viewer));
    };
    let form = KeyFeatureForm::from_feature(&feature);
    Ok(key_feature_form_page(&state, &admin.viewer, Some(&feature_id), &form, None))
}

async fn update_key_feature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<KeyFeatureForm>,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let feature_id = ItemId(id);
    let feature =
        state.key_features.find_by_id(&feature_id).await.map_err(|e| state.storage_failure(e))?;
    let Some(mut feature) = feature else {
        return Ok(not_found_page(&state, &admin.viewer));
    };
    if let Err(error) = form.apply_to(&mut feature) {
        let message = field_message(&error);
        return Ok(key_feature_form_page(&state, &admin.viewer, Some(&feature_id), &form, Some(message)));
    }

    let updated = state.key_features.update(feature).await.map_err(|e| state.storage_failure(e))?;
    if !updated {
        return Ok(not_found_page(&state, &admin.viewer));
    }
    Ok(Notice::FeatureUpdated.redirect("/admin/key-features").into_response())
}

/// Deletes the feature and closes the gap it leaves in the display order.
async fn delete_key_feature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AdminResult {
    let admin = require_admin(&state, &headers).await?;
    let feature_id = ItemId(id);
    let deleted =
        state.key_features.delete(&feature_id).await.map_err(|e| state.storage_failure(e))?;
    if !deleted {
        return Ok(not_found_page(&state, &admin.viewer));
    }

    let remaining = state.key_features.list_all().await.map_err(|e| state.storage_failure(e))?;
    let renumbered = OrderedList::from_persisted(remaining);
    if let Err(error) = renumbered.save(&KeyFeatureOrderStore::new(&*state.key_features)).await {
        warn!(event_name = "admin.key_feature.renumber_failed", error = %error, "order not compacted");
    }
    info!(event_name = "admin.key_feature.deleted", feature_id = %feature_id, "key feature deleted");
    Ok(Notice::FeatureDeleted.redirect("/admin/key-features").into_response())
}

async fn move_key_feature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<MoveForm>,
) -> AdminResult {
    require_admin(&state, &headers).await?;
    let feature_id = ItemId(id);
    let Some(direction) = form.direction() else {
        return Ok(Redirect::to("/admin/key-features").into_response());
    };

    let features = state.key_features.list_all().await.map_err(|e| state.storage_failure(e))?;
    let mut ordered = OrderedList::from_persisted(features);
    let moved = ordered
        .position(&feature_id)
        .is_some_and(|index| ordered.reorder(index, direction));
    if !moved {
        return Ok(Redirect::to("/admin/key-features").into_response());
    }

    if let Err(error) = ordered.save(&KeyFeatureOrderStore::new(&*state.key_features)).await {
        warn!(event_name = "admin.key_feature.move_failed", feature_id = %feature_id, error = %error, "order not saved");
        let remote = match error {
            SaveError::Remote(remote) => remote,
            SaveError::Validation(invalid) => {
                return Err(state.fail(DomainError::from(invalid)).into());
            }
        };
        return Err(state.fail(remote).into());
    }
    Ok(Notice::FeatureMoved.redirect("/admin/key-features").into_response())
}
