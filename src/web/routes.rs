//! HTTP route handlers
//!
//! Maps the automation boundary operations onto REST endpoints. All business
//! logic lives in the automation module; handlers only translate.

use std::sync::Arc;

use axum::{
    extract::{Extension, Json},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;

use crate::automation::RunConfig;
use crate::fingerprint::DeviceCategory;
use crate::AppState;

/// JSON error response helper
fn err_response(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({ "error": msg })))
}

/// Build the API router with all endpoints.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/open-url", post(open_url))
        .route("/stop", post(stop))
        .route("/automation-status", get(automation_status))
        .route("/logs", get(logs))
        .layer(Extension(state))
}

/// Request body for starting a run. Field names and defaults mirror the
/// operator-facing form.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartRunRequest {
    pub urls: Vec<String>,
    pub browser: String,
    /// Number of cycles.
    pub open_count: u32,
    pub profiles_per_url: u32,
    /// Per-navigation timeout in seconds.
    pub timeout: u64,
    pub min_wait_time: u64,
    pub max_wait_time: u64,
    pub device_category: DeviceCategory,
    pub proxy_url: Option<String>,
}

impl Default for StartRunRequest {
    fn default() -> Self {
        let defaults = RunConfig::default();
        Self {
            urls: Vec::new(),
            browser: defaults.engine,
            open_count: defaults.cycles,
            profiles_per_url: defaults.profiles_per_url,
            timeout: defaults.nav_timeout_secs,
            min_wait_time: defaults.min_wait_secs,
            max_wait_time: defaults.max_wait_secs,
            device_category: defaults.device_category,
            proxy_url: None,
        }
    }
}

impl StartRunRequest {
    pub fn into_config(self) -> RunConfig {
        RunConfig {
            urls: self.urls,
            engine: self.browser,
            cycles: self.open_count,
            profiles_per_url: self.profiles_per_url,
            nav_timeout_secs: self.timeout,
            min_wait_secs: self.min_wait_time,
            max_wait_secs: self.max_wait_time,
            device_category: self.device_category,
            proxy_url: self.proxy_url,
        }
    }
}

async fn open_url(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<StartRunRequest>,
) -> impl IntoResponse {
    let config = request.into_config();
    let total = config.total_sessions();

    match state.controller.start_run(config) {
        Ok(()) => {
            info!("Run started via web API ({} sessions)", total);
            Json(serde_json::json!({
                "success": true,
                "started": true,
                "totalSessions": total,
            }))
            .into_response()
        }
        Err(err) => err_response(StatusCode::BAD_REQUEST, &err.to_string()).into_response(),
    }
}

async fn stop(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    info!("Stop requested via web API");
    state.controller.request_stop();
    StatusCode::OK
}

async fn automation_status(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.status())
}

async fn logs(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.activity.dump(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_mirror_run_config() {
        let request = StartRunRequest::default();
        assert_eq!(request.browser, "random");
        assert_eq!(request.open_count, 1);
        assert_eq!(request.timeout, 30);
        assert_eq!(request.min_wait_time, 45);
        assert_eq!(request.max_wait_time, 55);
    }

    #[test]
    fn test_into_config_maps_fields() {
        let request = StartRunRequest {
            urls: vec!["https://example.com".to_string()],
            browser: "chromium".to_string(),
            open_count: 3,
            profiles_per_url: 2,
            timeout: 45,
            min_wait_time: 40,
            max_wait_time: 60,
            ..Default::default()
        };
        let config = request.into_config();
        assert_eq!(config.cycles, 3);
        assert_eq!(config.profiles_per_url, 2);
        assert_eq!(config.nav_timeout_secs, 45);
        assert_eq!(config.total_sessions(), 6);
        assert!(config.validate().is_ok());
    }
}
