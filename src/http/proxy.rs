//! Proxy load handler: the fixed-order answer to "give me the content at
//! this URL".
//!
//! 1. A target on our own host addressing the local-assets segment is served
//!    from disk through the path guard, with the spider field rewritten at
//!    read time (never persisted back).
//! 2. Otherwise a fresh cache entry, keyed by the MD5 of the full URL, is
//!    served verbatim.
//! 3. Otherwise the target is fetched live; bodies with status in [200,400)
//!    are cached and echoed, anything else propagates the upstream status
//!    with a plaintext diagnostic.
//!
//! The ordering is load-bearing: a locally-edited file must never be
//! shadowed by a stale cache entry for its own URL.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::fetch::FetchRequest;
use crate::{pathguard, spider, AppState};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

// ---------------------------------------------------------------------------
// Query type
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoadQuery {
    target_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// `GET /proxy/load?target_url=<url>`
#[instrument(skip(state, headers, query))]
pub async fn handle_load(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoadQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(target_url) = query.target_url else {
        return error_payload("missing target_url parameter");
    };

    // ---------- 1. Local same-host check ----------
    let request_host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(host_only);

    if let Ok(parsed) = Url::parse(&target_url) {
        if is_local_target(&parsed, request_host, &state.config.server.local_assets_segment) {
            state.metrics.metrics.local_serves.inc();
            return serve_local(&state, parsed.path()).await;
        }
    }

    // ---------- 2. Cache check ----------
    let cache_key = CacheStore::key_for(&target_url);
    if let Some(body) = state.cache.get(&cache_key) {
        debug!(key = %cache_key, "proxy cache hit");
        state.metrics.metrics.cache_hits.inc();
        return (StatusCode::OK, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body)
            .into_response();
    }
    state.metrics.metrics.cache_misses.inc();

    // ---------- 3. Live fetch ----------
    state.metrics.metrics.remote_fetches.inc();
    let response = match state.fetcher.fetch(FetchRequest::get(&target_url)).await {
        Ok(r) => r,
        Err(e) => {
            state.metrics.metrics.fetch_errors.inc();
            warn!(error = %e, url = %target_url, "proxy fetch failed");
            return error_payload(format!("fetch failed: {e}"));
        }
    };

    let code = response.status.as_u16();
    if (200..400).contains(&code) {
        if let Err(e) = state.cache.put(&cache_key, &response.body) {
            warn!(error = %e, key = %cache_key, "failed to cache fetched body");
        }
        let content_type = response
            .content_type
            .unwrap_or_else(|| JSON_CONTENT_TYPE.to_string());
        info!(url = %target_url, status = code, "proxy fetch served");
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type)],
            response.body,
        )
            .into_response();
    }

    state.metrics.metrics.upstream_errors.inc();
    warn!(url = %target_url, status = code, "upstream returned error status");
    (
        response.status,
        format!("Could not retrieve content from target server. Server returned error: HTTP {code}"),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Local serving
// ---------------------------------------------------------------------------

/// Serve a same-host target from the web root, rewriting the spider field of
/// JSON rule documents at read time.
async fn serve_local(state: &AppState, url_path: &str) -> Response {
    let web_root = &state.config.paths.web_root;
    let Some(local_path) = pathguard::resolve(web_root, url_path) else {
        return error_payload("local file not found or invalid path");
    };

    let bytes = match tokio::fs::read(&local_path).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, path = %local_path.display(), "local read failed");
            return error_payload("local file not found or invalid path");
        }
    };

    let body = render_local_document(&local_path, bytes);
    debug!(path = %local_path.display(), "served local file");
    (StatusCode::OK, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response()
}

/// If `bytes` parses as a JSON object with a string `spider` field, return
/// the document re-rendered with the field rewritten (pretty-printed,
/// slashes and unicode left unescaped). Anything else passes through
/// untouched. The source file is never modified.
fn render_local_document(doc_path: &Path, bytes: Vec<u8>) -> Vec<u8> {
    let Ok(mut doc) = serde_json::from_slice::<Value>(&bytes) else {
        return bytes;
    };
    let Some(field) = doc.get("spider").and_then(Value::as_str) else {
        return bytes;
    };

    let document_dir = doc_path.parent().unwrap_or(Path::new("."));
    let rewritten = spider::rewrite(document_dir, field);
    doc["spider"] = Value::String(rewritten);

    match serde_json::to_string_pretty(&doc) {
        Ok(s) => s.into_bytes(),
        Err(_) => bytes,
    }
}

// ---------------------------------------------------------------------------
// URL classification
// ---------------------------------------------------------------------------

/// Strip the port (and IPv6 brackets) from a `Host` header value.
fn host_only(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match host.rsplit_once(':') {
        Some((h, _)) => h,
        None => host,
    }
}

/// A target is local iff its host equals the host the client addressed us
/// by (ports ignored) and its path contains the local-assets segment.
fn is_local_target(target: &Url, request_host: Option<&str>, segment: &str) -> bool {
    let Some(request_host) = request_host else {
        return false;
    };
    let Some(target_host) = target.host_str() else {
        return false;
    };
    let target_host = target_host.trim_start_matches('[').trim_end_matches(']');
    target_host.eq_ignore_ascii_case(request_host) && target.path().contains(segment)
}

fn error_payload(message: impl Into<String>) -> Response {
    Json(serde_json::json!({ "error": message.into() })).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn host_only_strips_port() {
        assert_eq!(host_only("example.com:8089"), "example.com");
        assert_eq!(host_only("example.com"), "example.com");
        assert_eq!(host_only("[::1]:8089"), "::1");
    }

    #[test]
    fn local_target_requires_host_match_and_segment() {
        let segment = "/box/";
        let url = Url::parse("http://myhost/box/a.json").unwrap();
        assert!(is_local_target(&url, Some("myhost"), segment));
        assert!(is_local_target(&url, Some("MYHOST"), segment));
        assert!(!is_local_target(&url, Some("otherhost"), segment));
        assert!(!is_local_target(&url, None, segment));

        let outside = Url::parse("http://myhost/other/a.json").unwrap();
        assert!(!is_local_target(&outside, Some("myhost"), segment));
    }

    #[test]
    fn local_target_ignores_ports() {
        let url = Url::parse("http://myhost:8089/box/a.json").unwrap();
        assert!(is_local_target(&url, Some("myhost"), "/box/"));
    }

    #[test]
    fn render_rewrites_spider_field() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("lib.jar"), b"hello world").unwrap();
        let doc_path = dir.path().join("rules.json");

        let body = br#"{"spider":"./lib.jar;md5;stale","sites":[]}"#.to_vec();
        let rendered = render_local_document(&doc_path, body);
        let doc: Value = serde_json::from_slice(&rendered).unwrap();

        assert_eq!(
            doc["spider"],
            "./lib.jar;md5;5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        // Pretty-printed output, slashes unescaped.
        let text = String::from_utf8(rendered).unwrap();
        assert!(text.contains('\n'));
        assert!(text.contains("./lib.jar"));
    }

    #[test]
    fn render_degrades_to_bare_path_for_missing_asset() {
        let dir = tempdir().unwrap();
        let doc_path = dir.path().join("rules.json");

        let body = br#"{"spider":"./gone.jar;md5;stale"}"#.to_vec();
        let rendered = render_local_document(&doc_path, body);
        let doc: Value = serde_json::from_slice(&rendered).unwrap();
        assert_eq!(doc["spider"], "./gone.jar");
    }

    #[test]
    fn render_passes_through_non_json() {
        let dir = tempdir().unwrap();
        let doc_path = dir.path().join("notes.txt");

        let body = b"just some text".to_vec();
        assert_eq!(render_local_document(&doc_path, body.clone()), body);
    }

    #[test]
    fn render_passes_through_json_without_spider() {
        let dir = tempdir().unwrap();
        let doc_path = dir.path().join("plain.json");

        // Byte-for-byte passthrough: no re-rendering without a rewrite.
        let body = br#"{"lives":[ ]}"#.to_vec();
        assert_eq!(render_local_document(&doc_path, body.clone()), body);
    }
}
