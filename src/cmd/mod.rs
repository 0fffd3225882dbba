//! CLI command implementations.
//!
//! | Module    | Commands handled                    |
//! |-----------|-------------------------------------|
//! | `project` | `Init`, `Status`, `Submit`, `Reset` |
//! | `run`     | `Run`                               |
//! | `config`  | `Config`                            |

pub mod config;
pub mod project;
pub mod run;

pub use config::cmd_config;
pub use project::{cmd_init, cmd_reset, cmd_status, cmd_submit};
pub use run::cmd_run;
