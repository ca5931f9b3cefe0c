//! Main axum router and HTTP request handlers for the box config service.
//!
//! Routes:
//! - `GET  /proxy/load`           - Proxy/cache/local-serve state machine
//! - `POST /proxy/save_config`    - Write a config file under the box root
//! - `POST /proxy/download_asset` - Fetch a remote asset into the box root
//! - `GET  /proxy/list_files`     - Recursive file tree of the box root
//! - `GET  /proxy/check_file`     - Existence probe for a box-relative path
//! - `POST /proxy/create_rule`    - Create a rule file from a template
//! - `GET  /healthz`              - Health check
//! - `GET  /metrics`              - Prometheus metrics
//!
//! Client-triggerable failures on the `/proxy/*` surface answer with the
//! editor UI's ajax-style JSON payloads (`{"error": ...}` or
//! `{success, message}`) at HTTP 200; only upstream HTTP errors propagate a
//! non-200 status.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Form, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::fetch::FetchRequest;
use crate::pathguard;
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Proxy/cache surface
        .route("/proxy/load", get(super::proxy::handle_load))
        // File management under the box root
        .route("/proxy/save_config", post(handle_save_config))
        .route("/proxy/download_asset", post(handle_download_asset))
        .route("/proxy/list_files", get(handle_list_files))
        .route("/proxy/check_file", get(handle_check_file))
        .route("/proxy/create_rule", post(handle_create_rule))
        // Health, metrics
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Ajax-style response payloads
// ---------------------------------------------------------------------------

/// `{success, message}` payload shared by every mutating endpoint.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

fn ajax_ok(message: impl Into<String>) -> Response {
    Json(StatusResponse {
        success: true,
        message: message.into(),
    })
    .into_response()
}

fn ajax_fail(message: impl Into<String>) -> Response {
    Json(StatusResponse {
        success: false,
        message: message.into(),
    })
    .into_response()
}

// ---------------------------------------------------------------------------
// Form / query types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SaveConfigForm {
    dir: Option<String>,
    filename: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadAssetForm {
    source_url: Option<String>,
    target_dir: Option<String>,
    relative_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckFileQuery {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateRuleForm {
    relative_path: Option<String>,
    api_name: Option<String>,
    custom_content: Option<String>,
    save_as_default: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /proxy/save_config`
///
/// Writes `content` to `{box_root}/{dir}/{filename}`. The directory chain is
/// created on demand; containment is enforced on the canonicalized parent
/// before the write.
#[instrument(skip(state, form))]
async fn handle_save_config(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SaveConfigForm>,
) -> Response {
    let (Some(dir), Some(filename), Some(content)) = (form.dir, form.filename, form.content)
    else {
        return ajax_fail("missing save_config parameters");
    };

    let dir = pathguard::sanitize(&dir);
    let filename = pathguard::sanitize(&filename);
    if filename.is_empty() {
        return ajax_fail("filename must not be empty");
    }

    let box_root = &state.config.paths.box_root;
    let target_dir = box_root.join(&dir);
    if let Err(e) = tokio::fs::create_dir_all(&target_dir).await {
        warn!(error = %e, dir = %target_dir.display(), "failed to create target directory");
        return ajax_fail(format!("failed to create directory: {e}"));
    }

    let relative = if dir.is_empty() {
        filename.clone()
    } else {
        format!("{dir}/{filename}")
    };
    let Some(target) = pathguard::resolve_for_write(box_root, &relative) else {
        return ajax_fail("invalid save path");
    };

    match tokio::fs::write(&target, content).await {
        Ok(()) => {
            state.metrics.metrics.configs_saved.inc();
            info!(path = %target.display(), "configuration saved");
            ajax_ok("configuration saved")
        }
        Err(e) => {
            warn!(error = %e, path = %target.display(), "config write failed");
            ajax_fail(format!(
                "configuration write failed, check directory permissions: {e}"
            ))
        }
    }
}

/// `POST /proxy/download_asset`
///
/// Fetches `source_url` and writes the body to
/// `{box_root}/{target_dir}/{relative_path}`, creating intermediate
/// directories.
#[instrument(skip(state, form))]
async fn handle_download_asset(
    State(state): State<Arc<AppState>>,
    Form(form): Form<DownloadAssetForm>,
) -> Response {
    let (Some(source_url), Some(target_dir), Some(relative_path)) =
        (form.source_url, form.target_dir, form.relative_path)
    else {
        return ajax_fail("missing download_asset parameters");
    };

    let target_dir = pathguard::sanitize(&target_dir);
    let relative_path = pathguard::sanitize(&relative_path);
    if relative_path.is_empty() {
        return ajax_fail("relative_path must not be empty");
    }

    let relative = if target_dir.is_empty() {
        relative_path.clone()
    } else {
        format!("{target_dir}/{relative_path}")
    };

    let box_root = &state.config.paths.box_root;
    let full_path = box_root.join(&relative);
    if let Some(parent) = full_path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(error = %e, dir = %parent.display(), "failed to create asset directory");
            return ajax_fail(format!("failed to create directory: {e}"));
        }
    }

    let Some(target) = pathguard::resolve_for_write(box_root, &relative) else {
        return ajax_fail("invalid asset path");
    };

    state.metrics.metrics.remote_fetches.inc();
    let response = match state.fetcher.fetch(FetchRequest::get(&source_url)).await {
        Ok(r) => r,
        Err(e) => {
            state.metrics.metrics.fetch_errors.inc();
            warn!(error = %e, url = %source_url, "asset download failed");
            return ajax_fail(format!("download failed: {e}"));
        }
    };

    match tokio::fs::write(&target, &response.body).await {
        Ok(()) => {
            state.metrics.metrics.assets_downloaded.inc();
            info!(url = %source_url, path = %target.display(), "asset downloaded");
            ajax_ok(format!("asset downloaded: {}", target.display()))
        }
        Err(e) => {
            warn!(error = %e, path = %target.display(), "asset write failed");
            ajax_fail(format!("failed to write file locally: {e}"))
        }
    }
}

/// `GET /proxy/list_files`
///
/// Recursive listing of the box root as a JSON tree. An absent box root is
/// an empty listing, not an error.
#[instrument(skip(state))]
async fn handle_list_files(State(state): State<Arc<AppState>>) -> Response {
    let box_root = state.config.paths.box_root.clone();
    let tree = tokio::task::spawn_blocking(move || scan_directory(&box_root, &box_root)).await;

    match tree {
        Ok(tree) => Json(tree).into_response(),
        Err(e) => {
            error!(error = %e, "file listing task failed");
            AppError::Internal(anyhow::anyhow!("file listing failed: {e}")).into_response()
        }
    }
}

/// `GET /proxy/check_file?path=<rel>`
#[instrument(skip(state))]
async fn handle_check_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CheckFileQuery>,
) -> Response {
    let path = pathguard::sanitize(query.path.as_deref().unwrap_or_default());
    let exists = !path.is_empty() && state.config.paths.box_root.join(&path).exists();
    Json(serde_json::json!({ "exists": exists, "path": path })).into_response()
}

/// `POST /proxy/create_rule`
///
/// Creates `{box_root}/{relative_path}` from either the supplied custom
/// content or the `{template_root}/{api_name}.json` default template. With
/// `save_as_default`, custom content also replaces the template.
#[instrument(skip(state, form))]
async fn handle_create_rule(
    State(state): State<Arc<AppState>>,
    Form(form): Form<CreateRuleForm>,
) -> Response {
    let (Some(relative_path), Some(api_name)) = (form.relative_path, form.api_name) else {
        return ajax_fail("missing create_rule parameters");
    };

    let relative_path = pathguard::sanitize(&relative_path);
    let api_name = pathguard::sanitize(&api_name);
    if relative_path.is_empty() || api_name.is_empty() {
        return ajax_fail("missing create_rule parameters");
    }

    let save_as_default = truthy_flag(&form.save_as_default);
    let custom_content = form.custom_content.filter(|c| !c.is_empty());

    let box_root = &state.config.paths.box_root;
    let target = box_root.join(&relative_path);
    if let Some(parent) = target.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(error = %e, dir = %parent.display(), "failed to create rule directory");
            return ajax_fail(format!("failed to create directory: {e}"));
        }
    }

    let Some(target) = pathguard::resolve_for_write(box_root, &relative_path) else {
        return ajax_fail("invalid rule path");
    };

    let template_path = state
        .config
        .paths
        .template_root
        .join(format!("{api_name}.json"));

    let content = match &custom_content {
        Some(c) => c.clone(),
        None => match tokio::fs::read_to_string(&template_path).await {
            Ok(c) => c,
            Err(_) => {
                return ajax_fail(format!(
                    "default template {api_name}.json not found; supply custom content or \
                     create the template on the server"
                ));
            }
        },
    };

    if let Err(e) = tokio::fs::write(&target, &content).await {
        warn!(error = %e, path = %target.display(), "rule write failed");
        return ajax_fail(format!("rule file write failed: {e}"));
    }

    if save_as_default {
        if let Some(custom) = &custom_content {
            if let Some(template_dir) = template_path.parent() {
                let _ = tokio::fs::create_dir_all(template_dir).await;
            }
            if let Err(e) = tokio::fs::write(&template_path, custom).await {
                warn!(error = %e, path = %template_path.display(), "template update failed");
            }
        }
    }

    state.metrics.metrics.rules_created.inc();
    info!(path = %target.display(), "rule file created");
    ajax_ok("rule file created")
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    crate::health::health_handler(Arc::clone(&state.config), state.cache.root()).await
}

/// `GET /metrics`
///
/// Returns Prometheus metrics collected by the service.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let mut buf = String::new();
    prometheus_client::encoding::text::encode(&mut buf, &state.metrics.registry)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        buf,
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// One node of the `list_files` tree. Directories carry `children`; files
/// omit the key entirely.
#[derive(Debug, Serialize)]
pub struct FileNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

/// Recursively scan `dir`, reporting paths relative to `base`. Unreadable
/// entries are skipped rather than failing the whole listing.
fn scan_directory(dir: &Path, base: &Path) -> Vec<FileNode> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut nodes: Vec<FileNode> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");

            if path.is_dir() {
                Some(FileNode {
                    name,
                    kind: "dir",
                    path: relative,
                    children: Some(scan_directory(&path, base)),
                })
            } else {
                Some(FileNode {
                    name,
                    kind: "file",
                    path: relative,
                    children: None,
                })
            }
        })
        .collect();

    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    nodes
}

/// Form-flag truthiness: present, non-empty, and not the literal `"false"`.
fn truthy_flag(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some(v) if !v.is_empty() && v != "false")
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Application-level error type that maps cleanly to HTTP responses.
///
/// Client-triggerable failures never take this path (they are modeled as
/// ajax payloads); this covers genuinely unexpected internals.
#[derive(Debug)]
pub enum AppError {
    /// An unexpected internal error.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Internal(err) => {
                error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {err:#}"),
                )
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
