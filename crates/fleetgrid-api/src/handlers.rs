//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore` or `UpgradePolicy` and returns
//! JSON responses.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use semver::Version;
use tracing::info;

use fleetgrid_state::*;
use fleetgrid_upgrader::{TargetSelector, Targets, UpgraderError};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn upgrader_error(e: UpgraderError) -> axum::response::Response {
    let status = match e {
        UpgraderError::InvalidRate(_) => StatusCode::BAD_REQUEST,
        UpgraderError::State(StateError::NotFound(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status).into_response()
}

fn parse_version(raw: &str) -> Result<Version, axum::response::Response> {
    Version::parse(raw).map_err(|e| {
        error_response(
            &format!("invalid version '{raw}': {e}"),
            StatusCode::BAD_REQUEST,
        )
        .into_response()
    })
}

// ── Upgrader knobs ─────────────────────────────────────────────

/// GET /api/v1/upgrader
pub async fn get_upgrader(State(state): State<ApiState>) -> impl IntoResponse {
    match state.policy.settings() {
        Ok(settings) => ApiResponse::ok(settings).into_response(),
        Err(e) => upgrader_error(e),
    }
}

/// Upgrade rate request body.
#[derive(serde::Deserialize)]
pub struct RateRequest {
    pub upgrades_per_minute: f64,
}

/// PUT /api/v1/upgrader/upgrades-per-minute
pub async fn set_upgrades_per_minute(
    State(state): State<ApiState>,
    Json(req): Json<RateRequest>,
) -> impl IntoResponse {
    match state.policy.set_upgrades_per_minute(req.upgrades_per_minute) {
        Ok(()) => ApiResponse::ok(req.upgrades_per_minute).into_response(),
        Err(e) => upgrader_error(e),
    }
}

/// Target major version request body. `null` clears it.
#[derive(serde::Deserialize)]
pub struct MajorVersionRequest {
    #[serde(default)]
    pub target_major_version: Option<u64>,
}

/// PUT /api/v1/upgrader/target-major-version
pub async fn set_target_major_version(
    State(state): State<ApiState>,
    Json(req): Json<MajorVersionRequest>,
) -> impl IntoResponse {
    match state.policy.set_target_major_version(req.target_major_version) {
        Ok(()) => ApiResponse::ok(req.target_major_version).into_response(),
        Err(e) => upgrader_error(e),
    }
}

/// GET /api/v1/upgrader/targets
pub async fn get_targets(State(state): State<ApiState>) -> impl IntoResponse {
    match current_targets(&state) {
        Ok(targets) => ApiResponse::ok(targets).into_response(),
        Err(e) => upgrader_error(e),
    }
}

fn current_targets(state: &ApiState) -> Result<Targets, UpgraderError> {
    let status = state.store.version_status()?;
    let overrides = state.policy.confidence_overrides()?;
    Ok(TargetSelector::new(&status.versions, status.system_version.as_ref(), &overrides).targets())
}

// ── Confidence overrides ───────────────────────────────────────

/// GET /api/v1/upgrader/confidence-overrides
pub async fn list_confidence_overrides(State(state): State<ApiState>) -> impl IntoResponse {
    match state.policy.confidence_overrides() {
        Ok(overrides) => ApiResponse::ok(overrides).into_response(),
        Err(e) => upgrader_error(e),
    }
}

/// Confidence override request body.
#[derive(serde::Deserialize)]
pub struct OverrideRequest {
    pub confidence: Confidence,
}

/// PUT /api/v1/upgrader/confidence-overrides/:version
pub async fn override_confidence(
    State(state): State<ApiState>,
    Path(version): Path<String>,
    Json(req): Json<OverrideRequest>,
) -> impl IntoResponse {
    let version = match parse_version(&version) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.policy.override_confidence(version.clone(), req.confidence) {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "version": version,
            "confidence": req.confidence,
        }))
        .into_response(),
        Err(e) => upgrader_error(e),
    }
}

/// DELETE /api/v1/upgrader/confidence-overrides/:version
pub async fn remove_confidence_override(
    State(state): State<ApiState>,
    Path(version): Path<String>,
) -> impl IntoResponse {
    let version = match parse_version(&version) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.policy.remove_confidence_override(&version) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("override not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => upgrader_error(e),
    }
}

// ── Applications ───────────────────────────────────────────────

/// GET /api/v1/applications
pub async fn list_applications(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_applications() {
        Ok(applications) => ApiResponse::ok(applications).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/applications/:tenant/:application
pub async fn get_application(
    State(state): State<ApiState>,
    Path((tenant, application)): Path<(String, String)>,
) -> impl IntoResponse {
    let key = ApplicationId::new(&tenant, &application).table_key();
    match state.store.get_application(&key) {
        Ok(Some(record)) => ApiResponse::ok(record).into_response(),
        Ok(None) => error_response("application not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// PUT /api/v1/applications/:tenant/:application
pub async fn put_application(
    State(state): State<ApiState>,
    Path((tenant, application)): Path<(String, String)>,
    Json(record): Json<ApplicationRecord>,
) -> impl IntoResponse {
    let id = ApplicationId::new(&tenant, &application);
    if record.id != id {
        return error_response(
            &format!("body id {} does not match path {id}", record.id),
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    match state.store.put_application(&record) {
        Ok(()) => {
            info!(application = %id, tier = %record.tier, "application stored");
            ApiResponse::ok(record).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Versions ───────────────────────────────────────────────────

/// GET /api/v1/versions
pub async fn get_versions(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.version_status() {
        Ok(status) => ApiResponse::ok(status).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// PUT /api/v1/versions
pub async fn put_versions(
    State(state): State<ApiState>,
    Json(status): Json<VersionStatus>,
) -> impl IntoResponse {
    let status = VersionStatus::new(status.system_version, status.versions);
    match state.store.put_version_status(&status) {
        Ok(()) => {
            info!(
                system_version = ?status.system_version,
                versions = status.versions.len(),
                "version status replaced"
            );
            ApiResponse::ok(status).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
