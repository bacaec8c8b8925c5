//! Pure monitoring core: normalization, adherence, environment, trends and
//! the ranked alert feed. Nothing in here performs I/O.

pub mod adherence;
pub mod alerts;
pub mod engine;
pub mod environment;
pub mod messages;
pub mod normalizer;
pub mod status;
pub mod store;
pub mod trend;
pub mod types;

pub use engine::{MonitoringEngine, RawInputs, ScopeAnalysis};
pub use types::*;
