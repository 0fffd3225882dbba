//! Generation state storage and the small read-modify-write helpers shared
//! by the orchestrator, the deployment manager and the CLI.

pub mod files;
pub mod store;

pub use files::{save_files, unified_diff};
pub use store::{StateStore, Versioned};

use crate::errors::StateError;

/// Queue a follow-up request and raise the budget to at least `floor`.
///
/// Returns the number of inputs now pending.
pub fn submit_input(store: &StateStore, text: &str, floor: u32) -> Result<usize, StateError> {
    let text = text.trim().to_string();
    store.update(|s| {
        s.pending_inputs.push(text);
        s.recharge_budget(floor);
        s.pending_inputs.len()
    })
}

/// Take every pending input in one commit.
pub fn drain_inputs(store: &StateStore) -> Result<Vec<String>, StateError> {
    store.update(|s| std::mem::take(&mut s.pending_inputs))
}

/// Append successfully executed commands to the history, skipping duplicates.
pub fn record_commands(store: &StateStore, commands: &[String]) -> Result<(), StateError> {
    if commands.is_empty() {
        return Ok(());
    }
    store.update(|s| {
        for cmd in commands {
            if !s.command_history.contains(cmd) {
                s.command_history.push(cmd.clone());
            }
        }
    })
}

/// Forget the remote instance; the next deployment creates a new one.
pub fn invalidate_instance(store: &StateStore) -> Result<(), StateError> {
    store.update(|s| {
        s.sandbox_instance_id = None;
        s.preview_url = None;
    })
}

/// Replace the sandbox session with a fresh identity and drop the instance.
pub fn reset_session(store: &StateStore) -> Result<String, StateError> {
    let session_id = uuid::Uuid::new_v4().to_string();
    store.update(|s| {
        s.sandbox_session_id = Some(session_id.clone());
        s.sandbox_instance_id = None;
        s.preview_url = None;
    })?;
    Ok(session_id)
}
