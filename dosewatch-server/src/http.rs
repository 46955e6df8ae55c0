//! Dosewatch HTTP surface
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! taking plain arguments, so the request logic is testable without axum
//! dispatch.
//!
//! Endpoints:
//! - GET  /              — reminder form page
//! - POST /set_reminder  — authenticated reminder submission
//! - GET  /alarm_status  — is any reminder due this minute
//! - GET  /health        — liveness probe

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use dosewatch_core::config::HttpConfig;
use dosewatch_core::{Clock, DosewatchError, IdentityVerifier, ReminderSchedule, ReminderStore};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::subsystems::alarm::{check_alarm, AlarmStatus};
use crate::subsystems::submit::{submit_reminder, ReminderSubmission};

const FORM_TEMPLATE: &str = include_str!("../templates/reminder_form.html");
const SUCCESS_SLOT: &str = "{{ success_banner }}";
const SUCCESS_BANNER: &str = r#"<p class="banner" role="status">Reminder saved.</p>"#;

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub store: Arc<dyn ReminderStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub clock: Arc<dyn Clock>,
    pub schedule: ReminderSchedule,
}

pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/set_reminder", post(set_reminder_handler))
        .route("/alarm_status", get(alarm_status_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    config: &HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Dosewatch listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Fields posted by the reminder form. Every field is optional at this layer;
/// presence rules live in the submission subsystem.
#[derive(Debug, Deserialize, Default)]
pub struct SetReminderForm {
    #[serde(rename = "idToken")]
    pub id_token: Option<String>,
    pub medicine: Option<String>,
    pub dosage: Option<String>,
    pub time: Option<String>,
    pub daily: Option<String>,
}

impl From<SetReminderForm> for ReminderSubmission {
    fn from(form: SetReminderForm) -> Self {
        Self {
            id_token: form.id_token,
            medicine: form.medicine,
            dosage: form.dosage,
            time: form.time,
            // HTML checkboxes post "on" when ticked and nothing otherwise.
            daily: form.daily.as_deref() == Some("on"),
        }
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub fn render_form(saved: bool) -> String {
    FORM_TEMPLATE.replace(SUCCESS_SLOT, if saved { SUCCESS_BANNER } else { "" })
}

pub fn error_status(err: &DosewatchError) -> StatusCode {
    match err {
        DosewatchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        DosewatchError::InvalidRequest(_) | DosewatchError::InvalidTimeFormat(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Plain-text body for an error response. Store details stay in the logs.
pub fn error_body(err: &DosewatchError) -> String {
    match err {
        DosewatchError::Unauthorized(msg) | DosewatchError::InvalidRequest(msg) => msg.clone(),
        DosewatchError::InvalidTimeFormat(_) => err.to_string(),
        _ => "Failed to save reminder".to_string(),
    }
}

/// Resolve the form extractor's outcome. A body that is not form-encoded
/// carries no fields, so it proceeds as an empty form (and fails on the
/// missing token). A form body that cannot be decoded is a 400.
pub fn form_or_default(
    extracted: Result<Form<SetReminderForm>, FormRejection>,
) -> Result<SetReminderForm, (StatusCode, String)> {
    match extracted {
        Ok(Form(form)) => Ok(form),
        Err(FormRejection::InvalidFormContentType(_)) => Ok(SetReminderForm::default()),
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Malformed reminder form");
            Err((StatusCode::BAD_REQUEST, rejection.body_text()))
        }
    }
}

pub async fn set_reminder_inner(state: &HttpState, form: SetReminderForm) -> Result<String, DosewatchError> {
    let now = state.schedule.now(state.clock.as_ref());
    submit_reminder(form.into(), state.verifier.as_ref(), state.store.as_ref(), now).await?;
    Ok(render_form(true))
}

pub async fn alarm_status_inner(state: &HttpState) -> AlarmStatus {
    let now = state.schedule.now(state.clock.as_ref());
    check_alarm(state.store.as_ref(), &now).await.into()
}

// ============================================================================
// Axum handlers (thin wrappers)
// ============================================================================

pub async fn index_handler() -> Html<String> {
    Html(render_form(false))
}

pub async fn set_reminder_handler(
    State(state): State<Arc<HttpState>>,
    form: Result<Form<SetReminderForm>, FormRejection>,
) -> Response {
    let form = match form_or_default(form) {
        Ok(form) => form,
        Err(rejection) => return rejection.into_response(),
    };
    match set_reminder_inner(&state, form).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => (error_status(&e), error_body(&e)).into_response(),
    }
}

pub async fn alarm_status_handler(State(state): State<Arc<HttpState>>) -> Json<AlarmStatus> {
    Json(alarm_status_inner(&state).await)
}

pub async fn health_handler() -> &'static str {
    "ok"
}
