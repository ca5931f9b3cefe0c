//! HTTP layer for the box config proxy/cache service.
//!
//! This module provides the axum-based HTTP server: the proxy load state
//! machine, the file-management endpoints that write under the box root,
//! and the health/metrics surface.

pub mod handler;
pub mod proxy;
