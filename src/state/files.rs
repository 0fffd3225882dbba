//! File upserts with per-save diffs.

use chrono::{DateTime, Utc};
use phaseforge_common::{FileState, GeneratedFile, GenerationState};
use similar::TextDiff;

/// Unified diff between two versions of `path`.
pub fn unified_diff(old_content: &str, new_content: &str, path: &str) -> String {
    TextDiff::from_lines(old_content, new_content)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{}", path), &format!("b/{}", path))
        .to_string()
}

/// Upsert `files` into the state, diffing each against its prior content.
///
/// Returns the paths whose content actually changed. Unchanged files keep
/// their previous diff and timestamp.
pub fn save_files(
    state: &mut GenerationState,
    files: &[GeneratedFile],
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for file in files {
        let previous = state.file_states.get(&file.path);
        if previous.is_some_and(|p| p.content == file.content) {
            continue;
        }

        let old_content = previous.map(|p| p.content.as_str()).unwrap_or("");
        let diff = unified_diff(old_content, &file.content, &file.path);

        state.file_states.insert(
            file.path.clone(),
            FileState {
                content: file.content.clone(),
                last_modified_at: now,
                last_diff: diff,
            },
        );
        changed.push(file.path.clone());
    }

    changed
}
