//! Prompt text for each collaborator role.

use phaseforge_common::{CommandResult, GeneratedFile, Issue, PhaseDescriptor};
use std::fmt::Write;

fn push_issues(out: &mut String, issues: &[Issue]) {
    if issues.is_empty() {
        out.push_str("No known issues.\n");
        return;
    }
    for issue in issues {
        let _ = match &issue.file {
            Some(file) => writeln!(out, "- [{:?}] {}: {}", issue.source, file, issue.message),
            None => writeln!(out, "- [{:?}] {}", issue.source, issue.message),
        };
    }
}

pub fn plan_prompt(project: &str, issues: &[Issue], pending_inputs: &[String]) -> String {
    let mut p = format!(
        "You are planning the next phase of work for the project \"{}\".\n\n## Current issues\n",
        project
    );
    push_issues(&mut p, issues);
    if !pending_inputs.is_empty() {
        p.push_str("\n## User requests to address first\n");
        for input in pending_inputs {
            let _ = writeln!(p, "- {}", input);
        }
    }
    p.push_str(
        "\nRespond with ONLY a JSON object. Either\n\
         {\"phase\": {\"name\": \"...\", \"description\": \"...\", \
         \"files\": [{\"path\": \"...\", \"purpose\": \"...\"}], \"last_phase\": false}}\n\
         or {\"done\": true} when the project needs no further phases.\n",
    );
    p
}

pub fn implement_prompt(project: &str, phase: &PhaseDescriptor, issues: &[Issue]) -> String {
    let mut p = format!(
        "You are implementing the phase \"{}\" of the project \"{}\".\n\n{}\n\n## Files\n",
        phase.name, project, phase.description
    );
    for file in &phase.files {
        let _ = writeln!(p, "- {}: {}", file.path, file.purpose);
    }
    p.push_str("\n## Issues to fix along the way\n");
    push_issues(&mut p, issues);
    p.push_str(
        "\nRespond with ONLY a JSON object: {\"files\": [{\"path\": \"...\", \"content\": \"...\"}], \
         \"commands\": [\"setup commands, e.g. bun add <pkg>\"]}\n",
    );
    p
}

pub fn regenerate_prompt(file: &GeneratedFile, issues: &[String]) -> String {
    let mut p = format!(
        "Rewrite the file {} to fix these problems:\n",
        file.path
    );
    for issue in issues {
        let _ = writeln!(p, "- {}", issue);
    }
    let _ = write!(
        p,
        "\n## Current content\n{}\n\nRespond with ONLY a JSON object: \
         {{\"path\": \"{}\", \"content\": \"...\"}}\n",
        file.content, file.path
    );
    p
}

pub fn review_prompt(issues: &[Issue], files: &[GeneratedFile]) -> String {
    let mut p = String::from("Review this project for bugs and broken behaviour.\n\n## Known issues\n");
    push_issues(&mut p, issues);
    p.push_str("\n## Files\n");
    for file in files {
        let _ = writeln!(p, "### {}\n{}\n", file.path, file.content);
    }
    p.push_str(
        "\nRespond with ONLY a JSON object: {\"files_to_fix\": [{\"path\": \"...\", \
         \"issues\": [\"...\"]}], \"commands\": []}. Use empty lists when nothing needs fixing.\n",
    );
    p
}

pub fn alternatives_prompt(failed: &[CommandResult]) -> String {
    let mut p = String::from("These setup commands failed in the sandbox:\n");
    for result in failed {
        let _ = writeln!(
            p,
            "- `{}` (exit {}): {}",
            result.command,
            result
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".to_string()),
            result.output.trim()
        );
    }
    p.push_str(
        "\nSuggest replacement commands that achieve the same result. \
         Respond with ONLY a JSON object: {\"commands\": [\"...\"]}\n",
    );
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use phaseforge_common::IssueSource;

    #[test]
    fn test_plan_prompt_lists_pending_inputs() {
        let issues = vec![Issue {
            source: IssueSource::Runtime,
            message: "boom".into(),
            file: Some("src/App.tsx".into()),
        }];
        let p = plan_prompt("todo", &issues, &["add dark mode".into()]);
        assert!(p.contains("\"todo\""));
        assert!(p.contains("src/App.tsx: boom"));
        assert!(p.contains("- add dark mode"));
    }

    #[test]
    fn test_alternatives_prompt_includes_output() {
        let failed = vec![CommandResult {
            command: "npm install x".into(),
            success: false,
            output: "ERESOLVE\n".into(),
            exit_code: Some(1),
        }];
        let p = alternatives_prompt(&failed);
        assert!(p.contains("`npm install x` (exit 1): ERESOLVE"));
    }
}
