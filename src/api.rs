use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::analysis::{CrisisAnalysis, CrisisDetection, Severity, TextSource};
use crate::analytics::AnalyticsReport;
use crate::engine::{CrisisEngine, InvalidInput};
use crate::hotlines::EmergencyResponse;
use crate::lexicon;
use crate::profile::UserLearningProfile;
use crate::store::MoodLogEntry;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<CrisisEngine>,
}

pub fn create_router(engine: Arc<CrisisEngine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/crisis/analyze", post(analyze))
        .route("/crisis/detect", post(detect))
        .route("/crisis/alert", post(alert))
        .route("/crisis/emergency-response", post(emergency_response))
        .route("/crisis/profile/{user_id}", get(profile))
        .route("/mood/log", post(mood_log))
        .route("/mood/analytics/{user_id}", get(mood_analytics))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct AnalyzeReq {
    user_id: String,
    text: String,
    #[serde(default = "default_source")]
    source: TextSource,
    #[serde(default)]
    context: Option<serde_json::Value>,
}

fn default_source() -> TextSource {
    TextSource::Chat
}

async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeReq>,
) -> Result<Json<CrisisAnalysis>, (StatusCode, String)> {
    state
        .engine
        .analyze_text(&body.user_id, &body.text, body.source, body.context.as_ref())
        .await
        .map(Json)
        .map_err(error_status)
}

#[derive(serde::Deserialize)]
struct DetectReq {
    message: String,
}

async fn detect(Json(body): Json<DetectReq>) -> Json<CrisisDetection> {
    Json(lexicon::quick_scan(&body.message))
}

#[derive(serde::Deserialize)]
struct AlertReq {
    user_id: String,
    #[serde(default = "default_alert_severity")]
    severity: Severity,
    #[serde(default)]
    crisis_context: String,
    #[serde(default)]
    user_consent: bool,
}

fn default_alert_severity() -> Severity {
    Severity::High
}

#[derive(serde::Serialize)]
struct AlertResp {
    success: bool,
    message: &'static str,
    severity: Severity,
}

/// The response is deliberately identical whether or not an authority alert
/// actually fired; the caller only learns that the request was processed.
async fn alert(State(state): State<AppState>, Json(body): Json<AlertReq>) -> Json<AlertResp> {
    let severity = body.severity;
    state
        .engine
        .evaluate_and_notify(&body.user_id, severity, &body.crisis_context, body.user_consent)
        .await;
    Json(AlertResp {
        success: true,
        message: "Emergency response initiated",
        severity,
    })
}

#[derive(serde::Deserialize)]
struct EmergencyReq {
    #[serde(default)]
    country: Option<String>,
    #[serde(default = "default_alert_severity")]
    severity: Severity,
    #[serde(default)]
    crisis_context: String,
}

async fn emergency_response(
    State(state): State<AppState>,
    Json(body): Json<EmergencyReq>,
) -> Json<EmergencyResponse> {
    let resp = state
        .engine
        .emergency_response(body.country.as_deref(), body.severity, &body.crisis_context)
        .await;
    Json(resp)
}

async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserLearningProfile>, (StatusCode, String)> {
    state
        .engine
        .learning_profile(&user_id)
        .await
        .map(Json)
        .map_err(error_status)
}

#[derive(serde::Deserialize)]
struct MoodLogReq {
    user_id: String,
    text: String,
}

async fn mood_log(
    State(state): State<AppState>,
    Json(body): Json<MoodLogReq>,
) -> Result<Json<MoodLogEntry>, (StatusCode, String)> {
    state
        .engine
        .log_mood(&body.user_id, &body.text)
        .await
        .map(Json)
        .map_err(error_status)
}

async fn mood_analytics(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AnalyticsReport>, (StatusCode, String)> {
    state
        .engine
        .compute_analytics(&user_id)
        .await
        .map(Json)
        .map_err(error_status)
}

/// Input-validation failures are the caller's fault; anything else (store,
/// transport) is an internal error and must not masquerade as a 4xx.
fn error_status(err: anyhow::Error) -> (StatusCode, String) {
    if err.downcast_ref::<InvalidInput>().is_some() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    }
}
