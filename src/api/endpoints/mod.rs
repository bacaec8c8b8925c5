//! API endpoint handlers.
//!
//! Each module serves one view of a scope. Handlers load the scope's
//! committed resources through the monitor and derive everything else.

pub mod adherence;
pub mod alerts;
pub mod box_status;
pub mod dashboard;
pub mod feed;
pub mod health;
pub mod schedule;
pub mod trend;

use chrono::{DateTime, Utc};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ScopeQuery};
use crate::dashboard as views;
use crate::fetch::ScopeData;
use crate::monitoring::ScopeAnalysis;

/// Load the requested scope and enrol it in background polling.
pub(crate) async fn load_scope(
    ctx: &ApiContext,
    query: &ScopeQuery,
    now: DateTime<Utc>,
) -> Result<ScopeData, ApiError> {
    let kind = query.scope_kind()?;
    let viewer = query.viewer()?;

    let data = ctx.monitor.load(kind, &viewer, now).await?;
    ctx.poller.watch(data.scope.clone())?;
    Ok(data)
}

/// Load and analyze in one step.
pub(crate) async fn load_analysis(
    ctx: &ApiContext,
    query: &ScopeQuery,
    now: DateTime<Utc>,
    feed_limit: Option<usize>,
) -> Result<(ScopeData, ScopeAnalysis), ApiError> {
    let data = load_scope(ctx, query, now).await?;
    let analysis = views::analyze(&ctx.engine, &data, now, feed_limit)?;
    Ok((data, analysis))
}
