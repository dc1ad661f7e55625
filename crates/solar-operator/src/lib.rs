pub mod cluster;
pub mod condition;
pub mod config;
pub mod controller;
pub mod convergence;
pub mod crd;
pub mod error;
pub mod logging;
pub mod queue;
pub mod reconciler;
pub mod telemetry;
pub mod test_support;

// Re-export commonly used symbols for convenience in binaries/tests.
pub use crd::{Star, StarSpec, StarStatus};
pub use error::{Error, Result};
pub use reconciler::Reconciler;
