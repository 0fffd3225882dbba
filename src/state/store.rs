use chrono::Utc;
use phaseforge_common::GenerationState;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

use crate::errors::StateError;

/// A state record tagged with the version it was committed under.
#[derive(Debug, Clone)]
pub struct Versioned {
    pub version: u64,
    pub state: GenerationState,
}

/// Single source of truth for a project's `GenerationState`.
///
/// Every mutation replaces the record wholesale and bumps its version.
/// Writers either go through [`StateStore::update`], which applies a closure
/// to the current record under the store lock, or through
/// [`StateStore::compare_and_swap`], which rejects stale snapshots. Both rule
/// out the lost-update window of a bare read/modify/write.
///
/// When backed by a file, each commit is persisted (temp file + rename)
/// before it becomes visible; a failed write leaves the in-memory record
/// unchanged.
pub struct StateStore {
    inner: Mutex<Versioned>,
    path: Option<PathBuf>,
    watch_tx: watch::Sender<GenerationState>,
}

impl StateStore {
    /// Store without persistence.
    pub fn in_memory(state: GenerationState) -> Self {
        let (watch_tx, _) = watch::channel(state.clone());
        Self {
            inner: Mutex::new(Versioned { version: 0, state }),
            path: None,
            watch_tx,
        }
    }

    /// Load the record at `path`, or create and persist a fresh one.
    pub fn open(
        path: impl Into<PathBuf>,
        project_name: &str,
        phase_budget: u32,
    ) -> Result<Self, StateError> {
        let path = path.into();
        let state = if path.exists() {
            load_state(&path)?
        } else {
            let state = GenerationState::new(project_name, phase_budget);
            persist_state(&path, &state)?;
            state
        };

        let (watch_tx, _) = watch::channel(state.clone());
        Ok(Self {
            inner: Mutex::new(Versioned { version: 0, state }),
            path: Some(path),
            watch_tx,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Clone of the current record.
    pub fn snapshot(&self) -> GenerationState {
        self.lock_read().state.clone()
    }

    /// Clone of the current record with its version, for compare-and-swap.
    pub fn versioned(&self) -> Versioned {
        self.lock_read().clone()
    }

    pub fn version(&self) -> u64 {
        self.lock_read().version
    }

    /// Replace the record iff it is still at `expected_version`.
    pub fn compare_and_swap(
        &self,
        expected_version: u64,
        new_state: GenerationState,
    ) -> Result<u64, StateError> {
        let mut guard = self.lock_write()?;
        if guard.version != expected_version {
            return Err(StateError::VersionConflict {
                expected: expected_version,
                actual: guard.version,
            });
        }
        self.commit(&mut guard, new_state)
    }

    /// Apply `mutate` to a copy of the current record and commit the copy.
    pub fn update<T>(
        &self,
        mutate: impl FnOnce(&mut GenerationState) -> T,
    ) -> Result<T, StateError> {
        let mut guard = self.lock_write()?;
        let mut next = guard.state.clone();
        let out = mutate(&mut next);
        self.commit(&mut guard, next)?;
        Ok(out)
    }

    /// Read-only feed of committed records.
    pub fn subscribe(&self) -> watch::Receiver<GenerationState> {
        self.watch_tx.subscribe()
    }

    fn commit(
        &self,
        guard: &mut MutexGuard<'_, Versioned>,
        mut next: GenerationState,
    ) -> Result<u64, StateError> {
        next.updated_at = Utc::now();
        if let Some(path) = &self.path {
            persist_state(path, &next)?;
        }
        guard.version += 1;
        guard.state = next;
        self.watch_tx.send_replace(guard.state.clone());
        Ok(guard.version)
    }

    fn lock_write(&self) -> Result<MutexGuard<'_, Versioned>, StateError> {
        self.inner.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn lock_read(&self) -> MutexGuard<'_, Versioned> {
        // A panicked writer never commits a partial record, so the value is still whole.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_state(path: &Path) -> Result<GenerationState, StateError> {
    let content = std::fs::read_to_string(path).map_err(|e| StateError::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| StateError::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn persist_state(path: &Path, state: &GenerationState) -> Result<(), StateError> {
    let persist_err = |message: String| StateError::Persist {
        path: path.to_path_buf(),
        message,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| persist_err(e.to_string()))?;
    }
    let json = serde_json::to_string_pretty(state).map_err(|e| persist_err(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| persist_err(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| persist_err(e.to_string()))?;
    Ok(())
}
