//! HTTP API over the monitoring engine.
//!
//! Routes are nested under `/api/`. Views are derived per request from
//! the scope's committed resources; nothing here caches derived state.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer};
pub use types::ApiContext;
