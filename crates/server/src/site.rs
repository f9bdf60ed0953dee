//! Public pages.
//!
//! - `GET  /`                home, hero plus active key features
//! - `GET  /catalog`         active agents, newest first
//! - `GET  /catalog/events`  server-sent grid refreshes on agent changes
//! - `GET  /agent/{id}`      pricing and detail page
//! - `GET  /request`         lead wizard at its current step
//! - `POST /request`         wizard navigation (`action` = next|previous|reset)

use std::convert::Infallible;

use agentmart_core::auth::Viewer;
use agentmart_core::domain::agent::{Agent, AgentId, PlanTier};
use agentmart_core::domain::comparison::{CellValue, ComparisonRowKind};
use agentmart_core::domain::key_feature::active_in_order;
use agentmart_core::errors::RemoteCallError;
use agentmart_core::wizard::{
    CountryCode, LeadEdit, LeadSubmission, LeadWizard, RequestMeta, ServiceType,
    WizardAction, WizardError, WizardOutcome,
};
use agentmart_db::repositories::RepositoryError;
use agentmart_db::{EventMask, Notification, Table};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use chrono::Utc;
use futures::Stream;
use serde::Serialize;
use tera::Context;
use tracing::{info, warn};

use crate::render::{inline_notice, page_context, render, render_with_status, NoticeQuery, PageError};
use crate::state::AppState;
use crate::viewer::{cookie_value, resolve_viewer, set_cookie};
use crate::wizard_sessions::{new_browser_id, LEAD_COOKIE, LEAD_COOKIE_MAX_AGE_SECS};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/catalog", get(catalog))
        .route("/catalog/events", get(catalog_events))
        .route("/agent/{id}", get(agent_detail))
        .route("/request", get(request_form).post(request_step))
        .fallback(not_found)
        .with_state(state)
}

async fn home(
    State(state): State<AppState>,
    Query(query): Query<NoticeQuery>,
    headers: HeaderMap,
) -> Result<Response, PageError> {
    let viewer = resolve_viewer(&state, &headers).await;
    let features = state.key_features.list_active().await.map_err(|e| state.storage_failure(e))?;

    let mut context = page_context(&state, &viewer, query.notice());
    context.insert("key_features", &active_in_order(&features));
    Ok(render(&state.templates, "home.html", &context))
}

#[derive(Debug, Serialize)]
struct AgentCardView {
    id: String,
    name: String,
    short_description: String,
    image: String,
    starter_price: u32,
}

impl From<&Agent> for AgentCardView {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.0.clone(),
            name: agent.name.clone(),
            short_description: agent.short_description.clone(),
            image: agent.image.clone(),
            starter_price: agent.starter_price(),
        }
    }
}

async fn catalog_cards(state: &AppState) -> Result<Vec<AgentCardView>, RepositoryError> {
    let agents = state.agents.list_active().await?;
    Ok(agents.iter().map(AgentCardView::from).collect())
}

async fn catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, PageError> {
    let viewer = resolve_viewer(&state, &headers).await;
    let cards = catalog_cards(&state).await.map_err(|e| state.storage_failure(e))?;

    let mut context = page_context(&state, &viewer, None);
    context.insert("agents", &cards);
    Ok(render(&state.templates, "catalog.html", &context))
}

/// Streams a freshly rendered grid after every agent change. The subscription
/// lives exactly as long as the stream; a refetch still running when the
/// client disconnects is dropped with it.
async fn catalog_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.changes.subscribe(Table::Agents, EventMask::ALL);
    info!(
        event_name = "site.catalog.stream_opened",
        active = state.changes.active_subscriptions(),
        "catalog stream opened"
    );

    let stream = futures::stream::unfold((subscription, state), |(mut subscription, state)| async move {
        let notification = subscription.recv().await?;
        if let Notification::Resync = notification {
            warn!(event_name = "site.catalog.resync", "catalog stream resyncing after lag");
        }
        let event = match catalog_cards(&state).await {
            Ok(cards) => {
                let mut context = Context::new();
                context.insert("agents", &cards);
                match state.templates.render("catalog_grid.html", &context) {
                    Ok(html) => Event::default().event("catalog").data(html),
                    Err(error) => Event::default().event("catalog-error").data(error.to_string()),
                }
            }
            Err(error) => {
                warn!(event_name = "site.catalog.refetch_failed", error = %error, "catalog refetch failed");
                Event::default().event("catalog-error").data("Failed to load agents")
            }
        };
        Some((Ok(event), (subscription, state)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Serialize)]
struct PlanView {
    tier: &'static str,
    price: u32,
    features: Vec<String>,
    popular: bool,
    cta: &'static str,
}

#[derive(Debug, Serialize)]
struct ComparisonRowView {
    section: bool,
    label: String,
    cells: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ComparisonView {
    headers: Vec<String>,
    rows: Vec<ComparisonRowView>,
}

fn plan_views(agent: &Agent) -> Vec<PlanView> {
    agent
        .pricing
        .tiers()
        .map(|(tier, plan)| PlanView {
            tier: tier.label(),
            price: plan.price,
            features: plan.features.clone(),
            popular: tier.is_most_popular(),
            cta: if tier == PlanTier::Enterprise { "Contact Sales" } else { "Get Started" },
        })
        .collect()
}

fn comparison_view(agent: &Agent) -> Option<ComparisonView> {
    if !agent.shows_comparison() {
        return None;
    }
    let table = &agent.comparison_table;
    let rows = table
        .sorted_rows()
        .into_iter()
        .map(|row| ComparisonRowView {
            section: row.kind == ComparisonRowKind::Section,
            label: row.label.clone(),
            cells: row.values.iter().map(|value| CellValue::parse(value).display().to_string()).collect(),
        })
        .collect();
    Some(ComparisonView { headers: table.effective_headers(), rows })
}

async fn agent_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<NoticeQuery>,
    headers: HeaderMap,
) -> Result<Response, PageError> {
    let viewer = resolve_viewer(&state, &headers).await;
    let agent =
        state.agents.find_by_id(&AgentId(id)).await.map_err(|e| state.storage_failure(e))?;
    let Some(agent) = agent else {
        return Ok(not_found_page(&state, &viewer));
    };

    let mut context = page_context(&state, &viewer, query.notice());
    context.insert("agent", &agent);
    context.insert("visible_features", &agent.visible_features());
    context.insert("plans", &plan_views(&agent));
    context.insert("comparison", &comparison_view(&agent));
    context.insert("has_comparison_rows", &!agent.comparison_table.is_empty());
    Ok(render(&state.templates, "agent_detail.html", &context))
}

pub(crate) fn not_found_page(state: &AppState, viewer: &Viewer) -> Response {
    let context = page_context(state, viewer, None);
    render_with_status(StatusCode::NOT_FOUND, &state.templates, "not_found.html", &context)
}

async fn not_found(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let viewer = resolve_viewer(&state, &headers).await;
    not_found_page(&state, &viewer)
}

#[derive(Debug, Serialize)]
struct ChoiceView {
    value: &'static str,
    label: String,
    description: &'static str,
}

fn service_choices() -> Vec<ChoiceView> {
    ServiceType::ALL
        .into_iter()
        .map(|service| ChoiceView {
            value: service.id(),
            label: service.label().to_string(),
            description: service.description(),
        })
        .collect()
}

fn country_choices() -> Vec<ChoiceView> {
    CountryCode::ALL
        .into_iter()
        .map(|code| ChoiceView {
            value: code.dial_code(),
            label: format!("{} {}", code.flag(), code.dial_code()),
            description: "",
        })
        .collect()
}

fn wizard_context(
    state: &AppState,
    viewer: &Viewer,
    wizard: &LeadWizard,
    outcome: Option<&WizardOutcome>,
) -> Context {
    let wizard_state = wizard.state();
    let step = wizard_state.step();
    let mut context = page_context(state, viewer, None);

    context.insert("step_index", &wizard_state.current_step);
    context.insert("field", step.field().key());
    context.insert("prompt", step.prompt());
    context.insert("is_last_step", &step.is_last());
    context.insert("question_label", &wizard_state.question_label());
    context.insert("progress_percent", &wizard_state.progress_percent());
    context.insert("minutes_left", &wizard_state.minutes_left());
    context.insert("direction", &wizard_state.direction);
    context.insert("draft", &wizard_state.draft);
    context.insert(
        "service_type",
        &wizard_state.draft.service_type.map(|service| service.id()).unwrap_or(""),
    );
    context.insert("country_code", wizard_state.draft.country_code.dial_code());
    context.insert(
        "error",
        &wizard_state.field_errors.get(step.field()).map(str::to_string),
    );
    context.insert("submitted", &wizard_state.submitted);
    context.insert("draft_json", &wizard_state.draft.to_pretty_json());
    context.insert("services", &service_choices());
    context.insert("countries", &country_choices());

    let actions = outcome.map(|outcome| outcome.actions.as_slice()).unwrap_or_default();
    context.insert("shake", &actions.contains(&WizardAction::ShakeForm));
    if actions.contains(&WizardAction::NotifySubmitFailed) {
        inline_notice(&mut context, "error", "Failed to submit form. Please try again.");
    }
    if actions.contains(&WizardAction::NotifySubmitted) {
        inline_notice(&mut context, "success", "Thanks! We will be in touch shortly.");
    }
    context
}

async fn request_form(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let viewer = resolve_viewer(&state, &headers).await;
    let (browser_id, fresh) = match cookie_value(&headers, LEAD_COOKIE) {
        Some(id) => (id, false),
        None => (new_browser_id(), true),
    };

    let wizard = state.wizards.snapshot(&browser_id).await;
    let context = wizard_context(&state, &viewer, &wizard, None);
    let page = render(&state.templates, "request.html", &context);
    with_lead_cookie(page, &browser_id, fresh, state.settings.cookie_secure)
}

fn with_lead_cookie(mut response: Response, browser_id: &str, fresh: bool, secure: bool) -> Response {
    if fresh {
        let cookie = set_cookie(LEAD_COOKIE, browser_id, LEAD_COOKIE_MAX_AGE_SECS, secure);
        if let Ok(value) = cookie.parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

pub fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let header_text = |name: &str| {
        headers.get(name).and_then(|value| value.to_str().ok()).map(str::trim).unwrap_or("")
    };
    let forwarded = header_text("x-forwarded-for").split(',').next().unwrap_or("").trim();
    let ip_address = if forwarded.is_empty() { header_text("x-real-ip") } else { forwarded };

    RequestMeta {
        user_agent: header_text("user-agent").to_string(),
        ip_address: if ip_address.is_empty() { "unknown" } else { ip_address }.to_string(),
    }
}

enum StepResult {
    Outcome(WizardOutcome),
    Deliver(WizardOutcome, LeadSubmission),
    Ignored(WizardError),
}

/// Sends one submission and records the result on the browser's wizard.
/// A wizard that was reset or evicted meanwhile makes the result a no-op.
async fn deliver_lead(
    state: AppState,
    browser_id: String,
    submission: LeadSubmission,
) -> Option<WizardOutcome> {
    let delivered = state.lead_sink.deliver(&submission).await;
    if let Err(error) = &delivered {
        warn!(event_name = "site.lead.submit_failed", error = %error, "lead submission failed");
    }
    let completed =
        state.wizards.with(&browser_id, |wizard| wizard.complete_submission(delivered)).await;
    match completed {
        Ok(outcome) => {
            if outcome.actions.contains(&WizardAction::NotifySubmitted) {
                info!(event_name = "site.lead.submitted", "lead submitted");
            }
            Some(outcome)
        }
        Err(error) => {
            warn!(event_name = "site.lead.complete_failed", error = %error, "submission result dropped");
            None
        }
    }
}

/// Applies posted field values and the requested action. Delivery happens
/// with the session lock released; the in-flight guard turns a concurrent
/// second `next` into a no-op.
async fn request_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let Some(browser_id) = cookie_value(&headers, LEAD_COOKIE) else {
        return Redirect::to("/request").into_response();
    };
    let viewer = resolve_viewer(&state, &headers).await;
    let action = fields
        .iter()
        .find(|(name, _)| name == "action")
        .map(|(_, value)| value.clone())
        .unwrap_or_else(|| "next".to_string());
    let meta = request_meta(&headers);

    let result = state
        .wizards
        .with(&browser_id, |wizard| {
            if action == "reset" {
                return wizard.reset().map_or_else(StepResult::Ignored, StepResult::Outcome);
            }
            for (name, value) in &fields {
                if let Some(edit) = LeadEdit::from_form_field(name, value) {
                    if let Err(error) = wizard.edit(edit) {
                        return StepResult::Ignored(error);
                    }
                }
            }
            let stepped = if action == "previous" { wizard.previous() } else { wizard.next() };
            match stepped {
                Ok(outcome) if outcome.actions.contains(&WizardAction::SubmitLead) => {
                    let submission = wizard.submission(&meta, Utc::now());
                    StepResult::Deliver(outcome, submission)
                }
                Ok(outcome) => StepResult::Outcome(outcome),
                Err(error) => StepResult::Ignored(error),
            }
        })
        .await;

    let outcome = match result {
        StepResult::Outcome(outcome) => Some(outcome),
        StepResult::Ignored(error) => {
            info!(event_name = "site.lead.step_ignored", error = %error, "wizard step ignored");
            None
        }
        StepResult::Deliver(_, submission) => {
            // Detached so the in-flight guard is cleared even if the client
            // disconnects before delivery resolves.
            let delivery = tokio::spawn(deliver_lead(state.clone(), browser_id.clone(), submission));
            match delivery.await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(event_name = "site.lead.delivery_aborted", error = %error, "lead delivery task failed");
                    let failure = RemoteCallError::new("lead.deliver", error.to_string());
                    state
                        .wizards
                        .with(&browser_id, |wizard| wizard.complete_submission(Err(failure)))
                        .await
                        .ok()
                }
            }
        }
    };

    let wizard = state.wizards.snapshot(&browser_id).await;
    let context = wizard_context(&state, &viewer, &wizard, outcome.as_ref());
    let status = if outcome.as_ref().is_some_and(|o| o.actions.contains(&WizardAction::ShakeForm)) {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    render_with_status(status, &state.templates, "request.html", &context)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use agentmart_core::domain::agent::{Agent, AgentForm, AgentId, AgentPatch};
    use agentmart_core::domain::comparison::ComparisonRow;
    use agentmart_core::domain::key_feature::{KeyFeature, KeyFeatureKind};
    use agentmart_core::errors::RemoteCallError;
    use agentmart_core::ordered::{ItemId, OrderedItem, OrderedList};
    use agentmart_core::wizard::{InMemoryLeadSink, LeadSink, LeadSubmission};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    use super::router;
    use crate::state::testing::{in_memory_state, in_memory_state_with_sink};
    use crate::state::AppState;

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    fn agent(name: &str, active: bool) -> Agent {
        let form = AgentForm {
            name: name.to_string(),
            short_description: format!("{name} helps"),
            ..AgentForm::for_new_agent()
        };
        let mut agent = Agent::create(AgentId::generate(), form.parse().expect("valid"), Utc::now());
        agent.is_active = active;
        agent
    }

    fn app(state: &AppState) -> Router {
        router(state.clone())
    }

    async fn post_request(app: &Router, cookie: &str, body: &str) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::post("/request")
                    .header(header::COOKIE, cookie)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response")
    }

    #[tokio::test]
    async fn catalog_lists_only_active_agents() {
        let state = in_memory_state(InMemoryLeadSink::default());
        state.agents.insert(agent("Visible Bot", true)).await.expect("insert");
        state.agents.insert(agent("Hidden Bot", false)).await.expect("insert");

        let response = app(&state)
            .oneshot(Request::get("/catalog").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Visible Bot"));
        assert!(!html.contains("Hidden Bot"));
    }

    #[tokio::test]
    async fn unknown_agent_renders_not_found_page() {
        let state = in_memory_state(InMemoryLeadSink::default());

        let response = app(&state)
            .oneshot(Request::get("/agent/missing").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("Page not found"));
    }

    #[tokio::test]
    async fn agent_detail_shows_comparison_only_when_enabled() {
        let state = in_memory_state(InMemoryLeadSink::default());
        let stored = agent("Table Bot", true);
        state.agents.insert(stored.clone()).await.expect("insert");
        let mut rows: OrderedList<ComparisonRow> = OrderedList::new();
        let id = rows.add(agentmart_core::ComparisonRowKind::Feature).id.clone();
        rows.update(&id, agentmart_core::ComparisonRowEdit::Value { index: 0, value: "check".into() });
        let table = agentmart_core::ComparisonTable { headers: Vec::new(), rows: rows.into_items() };
        state.agents.apply_patch(&stored.id, AgentPatch::ComparisonTable(table)).await.expect("patch");

        let path = format!("/agent/{}", stored.id);
        let hidden = body_text(
            app(&state).oneshot(Request::get(&path).body(Body::empty()).expect("req")).await.expect("resp"),
        )
        .await;
        assert!(!hidden.contains("comparison-table"));

        state.agents.apply_patch(&stored.id, AgentPatch::ComparisonEnabled(true)).await.expect("patch");
        let shown = body_text(
            app(&state).oneshot(Request::get(&path).body(Body::empty()).expect("req")).await.expect("resp"),
        )
        .await;
        assert!(shown.contains("comparison-table"));
        assert!(shown.contains("✓"));
        assert!(shown.contains("Most Popular"));
    }

    #[tokio::test]
    async fn home_lists_active_key_features_in_order() {
        let state = in_memory_state(InMemoryLeadSink::default());
        for (id, order, active) in [("b", 2, true), ("a", 1, true), ("c", 3, false)] {
            let mut feature =
                KeyFeature::with_defaults(ItemId(id.to_string()), KeyFeatureKind::Standard, order);
            feature.title = format!("Feature {id}");
            feature.description = "Always on".to_string();
            feature.is_active = active;
            state.key_features.insert(feature).await.expect("insert");
        }

        let html = body_text(
            app(&state).oneshot(Request::get("/").body(Body::empty()).expect("req")).await.expect("resp"),
        )
        .await;

        let first = html.find("Feature a").expect("a shown");
        let second = html.find("Feature b").expect("b shown");
        assert!(first < second);
        assert!(!html.contains("Feature c"));
    }

    #[tokio::test]
    async fn first_visit_to_request_sets_lead_cookie() {
        let state = in_memory_state(InMemoryLeadSink::default());

        let response = app(&state)
            .oneshot(Request::get("/request").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(cookie.starts_with("am_lead="));
        assert!(body_text(response).await.contains("Question 1 → 6"));
    }

    #[tokio::test]
    async fn empty_company_name_stays_on_first_step() {
        let state = in_memory_state(InMemoryLeadSink::default());
        let app = app(&state);

        let response = post_request(&app, "am_lead=browser-1", "companyName=&action=next").await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_text(response).await.contains("Company name is required"));
        assert_eq!(state.wizards.snapshot("browser-1").await.state().current_step, 0);
    }

    #[tokio::test]
    async fn full_walk_delivers_one_lead() {
        let sink = InMemoryLeadSink::default();
        let state = in_memory_state(sink.clone());
        let app = app(&state);
        let cookie = "am_lead=browser-2";

        for body in [
            "companyName=Acme&action=next",
            "agentName=Helpdesk+Bot&action=next",
            "serviceType=support&action=next",
            "email=ops%40acme.io&action=next",
            "countryCode=%2B91&phone=5551234567&action=next",
            "description=We+need+an+agent+for+support+tickets&action=next",
        ] {
            let response = post_request(&app, cookie, body).await;
            assert_eq!(response.status(), StatusCode::OK, "step {body}");
        }

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].form_data.phone, "+91-(555) 123-4567");
        assert_eq!(delivered[0].form_data.option_base, "support");
        assert!(state.wizards.snapshot("browser-2").await.state().submitted);

        let again = post_request(&app, cookie, "action=next").await;
        assert_eq!(again.status(), StatusCode::OK);
        assert_eq!(sink.delivered().len(), 1);

        post_request(&app, cookie, "action=reset").await;
        let reset = state.wizards.snapshot("browser-2").await;
        assert!(!reset.state().submitted);
        assert_eq!(reset.state().current_step, 0);
    }

    #[tokio::test]
    async fn failed_delivery_stays_on_last_step_for_retry() {
        let sink = InMemoryLeadSink::failing("webhook down");
        let state = in_memory_state(sink.clone());
        let app = app(&state);
        let cookie = "am_lead=browser-3";
        for body in [
            "companyName=Acme&action=next",
            "agentName=Bot&action=next",
            "serviceType=buy&action=next",
            "email=a%40b.co&action=next",
            "phone=555-123-4567&action=next",
        ] {
            post_request(&app, cookie, body).await;
        }

        let response =
            post_request(&app, cookie, "description=Twenty+characters+long+at+least&action=next")
                .await;

        let html = body_text(response).await;
        assert!(html.contains("Failed to submit form"));
        let wizard = state.wizards.snapshot("browser-3").await;
        assert_eq!(wizard.state().current_step, 5);
        assert!(!wizard.state().submitted);
        assert!(!wizard.state().submission_in_flight);
        assert_eq!(sink.delivered().len(), 1);
    }

    /// Holds every delivery until `release` is notified.
    #[derive(Default)]
    struct GatedSink {
        release: Notify,
        delivered: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LeadSink for GatedSink {
        async fn deliver(&self, _submission: &LeadSubmission) -> Result<(), RemoteCallError> {
            self.release.notified().await;
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn wait_for_in_flight(state: &AppState, browser_id: &str, expected: bool) {
        for _ in 0..200 {
            if state.wizards.snapshot(browser_id).await.state().submission_in_flight == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("submission_in_flight never became {expected}");
    }

    #[tokio::test]
    async fn dropped_request_still_completes_its_delivery() {
        let sink = Arc::new(GatedSink::default());
        let state = in_memory_state_with_sink(sink.clone());
        let app = app(&state);
        let cookie = "am_lead=browser-4";
        for body in [
            "companyName=Acme&action=next",
            "agentName=Bot&action=next",
            "serviceType=inquiries&action=next",
            "email=a%40b.co&action=next",
            "phone=5551234567&action=next",
        ] {
            post_request(&app, cookie, body).await;
        }

        let final_step = {
            let app = app.clone();
            tokio::spawn(async move {
                post_request(&app, cookie, "description=Twenty+characters+long+at+least&action=next")
                    .await
            })
        };
        wait_for_in_flight(&state, "browser-4", true).await;
        final_step.abort();
        assert!(final_step.await.is_err_and(|error| error.is_cancelled()));
        assert!(state.wizards.snapshot("browser-4").await.state().submission_in_flight);

        sink.release.notify_one();
        wait_for_in_flight(&state, "browser-4", false).await;

        let wizard = state.wizards.snapshot("browser-4").await;
        assert!(wizard.state().submitted);
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 1);

        post_request(&app, cookie, "action=reset").await;
        let reset = state.wizards.snapshot("browser-4").await;
        assert!(!reset.state().submitted);
        assert_eq!(reset.state().current_step, 0);
    }

    #[tokio::test]
    async fn catalog_stream_holds_a_subscription_while_open() {
        let state = in_memory_state(InMemoryLeadSink::default());

        let response = app(&state)
            .oneshot(Request::get("/catalog/events").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(state.changes.active_subscriptions(), 1);
        drop(response);
        assert_eq!(state.changes.active_subscriptions(), 0);
    }

    #[test]
    fn request_meta_prefers_forwarded_address() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().expect("header"));
        headers.insert("user-agent", "curl/8".parse().expect("header"));

        let meta = super::request_meta(&headers);

        assert_eq!(meta.ip_address, "203.0.113.9");
        assert_eq!(meta.user_agent, "curl/8");
        assert_eq!(super::request_meta(&axum::http::HeaderMap::new()).ip_address, "unknown");
    }
}
