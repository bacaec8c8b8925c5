//! Shared state and request types for the HTTP layer.

use std::sync::Arc;

use serde::Deserialize;

use crate::api::error::ApiError;
use crate::config::MonitorConfig;
use crate::fetch::{ScopeMonitor, StatusPoller};
use crate::models::enums::ScopeKind;
use crate::models::SubjectId;
use crate::monitoring::MonitoringEngine;

/// Upper bound on any caller-supplied list limit.
pub const MAX_LIMIT: usize = 200;

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<MonitoringEngine>,
    pub monitor: Arc<ScopeMonitor>,
    pub poller: Arc<StatusPoller>,
    pub config: Arc<MonitorConfig>,
}

impl ApiContext {
    pub fn new(
        engine: Arc<MonitoringEngine>,
        monitor: Arc<ScopeMonitor>,
        poller: Arc<StatusPoller>,
        config: Arc<MonitorConfig>,
    ) -> Self {
        Self {
            engine,
            monitor,
            poller,
            config,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Query parameters
// ═══════════════════════════════════════════════════════════

/// `?scope=<self|household|managed>&viewer=<id>`
#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    pub scope: Option<String>,
    pub viewer: Option<String>,
    pub limit: Option<String>,
}

impl ScopeQuery {
    /// Scope kind defaults to `self` when omitted.
    pub fn scope_kind(&self) -> Result<ScopeKind, ApiError> {
        match self.scope.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(ScopeKind::SelfOnly),
            Some(raw) => raw
                .parse::<ScopeKind>()
                .map_err(|e| ApiError::BadRequest(e.to_string())),
        }
    }

    pub fn viewer(&self) -> Result<SubjectId, ApiError> {
        self.viewer
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(SubjectId::new)
            .ok_or_else(|| ApiError::BadRequest("viewer is required".into()))
    }

    /// Positive limit capped at `MAX_LIMIT`; anything unusable falls back.
    pub fn limit_or(&self, fallback: usize) -> usize {
        parse_limit(self.limit.as_deref(), fallback)
    }
}

pub fn parse_limit(raw: Option<&str>, fallback: usize) -> usize {
    match raw.and_then(|s| s.trim().parse::<f64>().ok()) {
        Some(n) if n.is_finite() && n > 0.0 => (n as usize).clamp(1, MAX_LIMIT),
        _ => fallback,
    }
}
