//! Fetch coordination: upstream access, request fingerprints and
//! cancellation, the injectable resource store, and the status poller.

pub mod http;
pub mod ledger;
pub mod monitor;
pub mod poller;
pub mod source;
pub mod store;
pub mod types;

pub use http::HttpSource;
pub use monitor::{FetchSettings, ScopeData, ScopeMonitor};
pub use poller::StatusPoller;
pub use source::MonitoringSource;
pub use store::{InMemoryStore, MonitorStore};
pub use types::*;
