use std::path::Path;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::config::Config;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub box_root: CheckResult,
    pub cache_root: CheckResult,
    pub template_root: CheckResult,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn healthy() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

fn check_dir(path: &Path, what: &str) -> CheckResult {
    if path.is_dir() {
        CheckResult::healthy()
    } else {
        CheckResult::unhealthy(format!("{what} {} is not a directory", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Aggregate status
// ---------------------------------------------------------------------------

fn aggregate_status(checks: &HealthChecks) -> HealthStatus {
    // The box root is required for every endpoint; the cache and template
    // directories are recreated on demand, so their absence only degrades.
    if !checks.box_root.ok {
        HealthStatus::Unhealthy
    } else if !checks.cache_root.ok || !checks.template_root.ok {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz` handler. Returns 200 on Ok/Degraded, 503 on Unhealthy.
pub async fn health_handler(config: Arc<Config>, cache_root: &Path) -> impl IntoResponse {
    let checks = HealthChecks {
        box_root: check_dir(&config.paths.box_root, "box root"),
        cache_root: check_dir(cache_root, "cache root"),
        template_root: check_dir(&config.paths.template_root, "template root"),
    };

    let status = aggregate_status(&checks);
    let body = HealthResponse { status, checks };

    let http_status = match status {
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> CheckResult {
        CheckResult::healthy()
    }

    fn bad() -> CheckResult {
        CheckResult::unhealthy("missing")
    }

    #[test]
    fn all_ok_is_ok() {
        let checks = HealthChecks {
            box_root: ok(),
            cache_root: ok(),
            template_root: ok(),
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Ok);
    }

    #[test]
    fn missing_box_root_is_unhealthy() {
        let checks = HealthChecks {
            box_root: bad(),
            cache_root: ok(),
            template_root: ok(),
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Unhealthy);
    }

    #[test]
    fn missing_cache_root_only_degrades() {
        let checks = HealthChecks {
            box_root: ok(),
            cache_root: bad(),
            template_root: ok(),
        };
        assert_eq!(aggregate_status(&checks), HealthStatus::Degraded);
    }
}
