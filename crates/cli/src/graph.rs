//! `txflow graph` -- print the default workflow.

use std::fmt::Write as _;
use std::process;

use serde::Serialize;
use time::OffsetDateTime;
use txflow_engine::{GraphIssue, WorkflowGraph};
use txflow_storage::{seed, StatusRecord, TransitionRecord};

use crate::OutputFormat;

#[derive(Serialize)]
struct GraphReport<'a> {
    statuses: &'a [StatusRecord],
    transitions: &'a [TransitionRecord],
    issues: &'a [GraphIssue],
}

pub(crate) fn cmd_graph(output: OutputFormat) {
    let now = OffsetDateTime::now_utc();
    let graph = WorkflowGraph::new(seed::statuses(now), seed::transitions(now));

    match output {
        OutputFormat::Json => {
            let report = GraphReport {
                statuses: graph.statuses(),
                transitions: graph.transitions(),
                issues: graph.issues(),
            };
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("error: failed to serialize graph: {}", e);
                    process::exit(1);
                }
            }
        }
        OutputFormat::Text => print!("{}", render_text(&graph)),
    }
}

fn render_text(graph: &WorkflowGraph) -> String {
    let mut out = String::new();
    let name_width = graph
        .statuses()
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0);

    let _ = writeln!(out, "Statuses:");
    for status in graph.statuses() {
        let mut flags = Vec::new();
        if status.is_initial {
            flags.push("initial");
        }
        if status.is_final {
            flags.push("final");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!("  [{}]", flags.join(", "))
        };
        let _ = writeln!(
            out,
            "  {:>3}  {:<width$}{}",
            status.id.0,
            status.name,
            flags,
            width = name_width
        );
    }

    let _ = writeln!(out, "\nTransitions:");
    for edge in graph.transitions() {
        let mut notes = Vec::new();
        if edge.requires_comment {
            notes.push("requires reason");
        }
        if edge.is_rollback {
            notes.push("rollback");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        let _ = writeln!(
            out,
            "  {} -> {}: {}{}",
            edge.from_status_name, edge.to_status_name, edge.name, notes
        );
    }

    if graph.issues().is_empty() {
        let _ = writeln!(out, "\nNo consistency issues.");
    } else {
        let _ = writeln!(out, "\nIssues:");
        for issue in graph.issues() {
            let _ = writeln!(out, "  - {}", issue);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_graph() -> WorkflowGraph {
        let now = OffsetDateTime::now_utc();
        WorkflowGraph::new(seed::statuses(now), seed::transitions(now))
    }

    #[test]
    fn text_lists_statuses_with_flags() {
        let text = render_text(&seed_graph());
        let line = |name: &str| {
            text.lines()
                .find(|l| l.contains(name))
                .map(str::to_string)
                .unwrap_or_default()
        };
        assert!(line("Created").ends_with("[initial]"), "{text}");
        assert!(line("Completed").ends_with("[final]"), "{text}");
        assert!(line("Processing").ends_with("Processing"), "{text}");
    }

    #[test]
    fn text_lists_edges_with_notes() {
        let text = render_text(&seed_graph());
        assert!(text.contains("Processing -> Failed: Fail (requires reason)"));
        assert!(text.contains("Failed -> Validated: Retry (rollback)"));
        assert!(text.contains("Created -> Validated: Validate\n"));
        assert!(text.ends_with("No consistency issues.\n"));
    }

    #[test]
    fn text_reports_issues() {
        let now = OffsetDateTime::now_utc();
        let statuses = seed::statuses(now)
            .into_iter()
            .map(|mut s| {
                s.is_initial = false;
                s
            })
            .collect();
        let text = render_text(&WorkflowGraph::new(statuses, seed::transitions(now)));
        assert!(text.contains("Issues:\n  - no status is flagged initial"), "{text}");
    }
}
