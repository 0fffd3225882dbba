//! Decoding Claude replies into collaborator results.

use anyhow::{Context, Result, bail};
use phaseforge_common::{GeneratedFile, PhaseDescriptor, PhaseOutput, ReviewVerdict};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::util::{extract_json_object, strip_code_fence};

#[derive(Debug, Deserialize)]
struct PlanReply {
    #[serde(default)]
    phase: Option<PhaseDescriptor>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct AlternativesReply {
    #[serde(default)]
    commands: Vec<String>,
}

fn parse_json<T: DeserializeOwned>(output: &str) -> Result<T> {
    let json = extract_json_object(strip_code_fence(output))
        .ok_or_else(|| anyhow::anyhow!("No JSON object found in Claude's output"))?;
    serde_json::from_str(&json).context("Failed to parse JSON from Claude's output")
}

/// `{"phase": {...}}` plans a phase; `{"done": true}` or `{"phase": null}` ends planning.
pub fn parse_plan(output: &str) -> Result<Option<PhaseDescriptor>> {
    let reply: PlanReply = parse_json(output)?;
    if reply.done {
        return Ok(None);
    }
    match reply.phase {
        Some(phase) if phase.name.trim().is_empty() => bail!("Planned phase has no name"),
        other => Ok(other),
    }
}

pub fn parse_implementation(output: &str) -> Result<PhaseOutput> {
    let mut out: PhaseOutput = parse_json(output)?;
    out.files.retain(|f| !f.path.trim().is_empty());
    Ok(out)
}

pub fn parse_file(output: &str, expected_path: &str) -> Result<GeneratedFile> {
    let file: GeneratedFile = parse_json(output)?;
    if file.path != expected_path {
        bail!(
            "Regenerated file path mismatch: expected {}, got {}",
            expected_path,
            file.path
        );
    }
    Ok(file)
}

pub fn parse_review(output: &str) -> Result<ReviewVerdict> {
    parse_json(output)
}

pub fn parse_alternatives(output: &str) -> Result<Vec<String>> {
    let reply: AlternativesReply = parse_json(output)?;
    Ok(reply.commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_with_phase() {
        let output = r#"Next up:
{"phase": {"name": "Board layout", "description": "Columns", "files": [{"path": "src/Board.tsx", "purpose": "board"}]}}"#;
        let phase = parse_plan(output).unwrap().unwrap();
        assert_eq!(phase.name, "Board layout");
        assert_eq!(phase.files[0].path, "src/Board.tsx");
        assert!(!phase.last_phase);
    }

    #[test]
    fn test_parse_plan_done() {
        assert!(parse_plan(r#"{"done": true}"#).unwrap().is_none());
        assert!(parse_plan(r#"{"phase": null}"#).unwrap().is_none());
    }

    #[test]
    fn test_parse_plan_rejects_nameless_phase() {
        assert!(parse_plan(r#"{"phase": {"name": "  "}}"#).is_err());
    }

    #[test]
    fn test_parse_implementation_drops_blank_paths() {
        let output = "```json\n{\"files\": [{\"path\": \"a.ts\", \"content\": \"export {}\"}, {\"path\": \"\", \"content\": \"x\"}], \"commands\": [\"bun add zod\"]}\n```";
        let out = parse_implementation(output).unwrap();
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.files[0].content, "export {}");
        assert_eq!(out.commands, vec!["bun add zod"]);
    }

    #[test]
    fn test_parse_file_checks_path() {
        let output = r#"{"path": "a.ts", "content": "fixed"}"#;
        assert_eq!(parse_file(output, "a.ts").unwrap().content, "fixed");
        assert!(parse_file(output, "b.ts").is_err());
    }

    #[test]
    fn test_parse_review_defaults_to_clean() {
        assert!(parse_review("{}").unwrap().is_clean());
    }

    #[test]
    fn test_parse_alternatives() {
        let cmds = parse_alternatives(r#"{"commands": ["bun add left-pad"]}"#).unwrap();
        assert_eq!(cmds, vec!["bun add left-pad"]);
    }

    #[test]
    fn test_no_json_is_an_error() {
        assert!(parse_review("I could not review this").is_err());
    }
}
