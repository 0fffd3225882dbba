//! Command list cleanup and classification.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

// Compile regexes once using LazyLock
static INSTALL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:npm|bun|pnpm|yarn)\s+(?:install|i|add)(?:\s|$)").unwrap()
});

static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Normalize one command line, or `None` when nothing executable remains.
pub fn sanitize_command(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("$ ").unwrap_or(trimmed).trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(WHITESPACE_REGEX.replace_all(trimmed, " ").into_owned())
}

/// Sanitize and dedupe, keeping first-seen order.
pub fn sanitize_commands(commands: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    commands
        .iter()
        .filter_map(|c| sanitize_command(c))
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

/// Package-manager install/add commands, the class worth asking for alternatives.
pub fn is_install_command(command: &str) -> bool {
    INSTALL_REGEX.is_match(command.trim())
}

/// Collapse a long history to its unique entries in first-seen order.
pub fn collapse_history(history: &[String], limit: usize) -> Vec<String> {
    if history.len() <= limit {
        return history.to_vec();
    }
    sanitize_commands(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize_command_strips_prompt_and_whitespace() {
        assert_eq!(
            sanitize_command("  $ npm   install   react  ").as_deref(),
            Some("npm install react")
        );
        assert_eq!(sanitize_command("   "), None);
        assert_eq!(sanitize_command("# comment"), None);
    }

    #[test]
    fn test_sanitize_commands_dedupes_in_order() {
        let cleaned = sanitize_commands(&strings(&[
            "bun add zod",
            "",
            "rm -rf dist",
            "bun  add zod",
            "$ rm -rf dist",
        ]));
        assert_eq!(cleaned, strings(&["bun add zod", "rm -rf dist"]));
    }

    #[test]
    fn test_is_install_command() {
        assert!(is_install_command("npm install left-pad"));
        assert!(is_install_command("npm i left-pad"));
        assert!(is_install_command("bun add left-pad"));
        assert!(is_install_command("pnpm add -D vitest"));
        assert!(is_install_command("yarn install"));
        assert!(!is_install_command("npm run build"));
        assert!(!is_install_command("npx install-peerdeps"));
        assert!(!is_install_command("rm -rf node_modules"));
        assert!(!is_install_command("npm init"));
    }

    #[test]
    fn test_collapse_history_only_above_limit() {
        let history = strings(&["a", "b", "a"]);
        assert_eq!(collapse_history(&history, 10), history);
        assert_eq!(collapse_history(&history, 2), strings(&["a", "b"]));
    }
}
