//! Sandbox deployment.
//!
//! - `manager` — single-flight `DeploymentManager` with timeout and retries
//! - `retry` — backoff schedule and session-reset classification
//! - `health` — restartable `HealthMonitor` probe task

pub mod health;
pub mod manager;
pub mod retry;

pub use health::{HealthMonitor, RedeployTarget};
pub use manager::{DeployResult, DeploymentManager, PreviewHandle, instance_name};
pub use retry::{backoff_delay, backoff_schedule, requires_session_reset};
