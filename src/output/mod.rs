//! CLI output formatting and display helpers.

use std::io::IsTerminal;
use std::path::Path;

use bundler_core::{RunResult, RunStatus};

/// Message when stdin is a terminal and no input file was given.
pub const NO_INPUT_GUIDANCE: &str =
    "No input provided. Pass an attachment list JSON file or pipe it via stdin.";

/// Example for piping input.
pub const INPUT_PIPE_EXAMPLE: &str =
    "Example: cat attachments.json | attachment-bundler --base-url https://dash.example.com/api/attachments";

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending ellipsis if truncated.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let text_len = text.chars().count();
    if text_len <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    if width == 1 {
        return "…".to_string();
    }

    let mut output: String = text.chars().take(width - 1).collect();
    output.push('…');
    output
}

/// Prints input guidance to stderr.
pub fn print_input_guidance() {
    let width = terminal_width().min(100);
    eprintln!("{}", truncate_to_width(NO_INPUT_GUIDANCE, width));
    eprintln!("{}", truncate_to_width(INPUT_PIPE_EXAMPLE, width));
}

/// Lines describing a finished run: a headline, then one line per missing
/// attachment in input order.
pub fn run_summary_lines(
    result: &RunResult,
    archive_path: Option<&Path>,
    width: usize,
) -> Vec<String> {
    let headline = match result.status() {
        RunStatus::AllSucceeded => format!("Archived all {} attachments", result.total()),
        RunStatus::PartialSuccess => format!(
            "Archived {} of {} attachments; {} missing",
            result.succeeded_count(),
            result.total(),
            result.failed().len()
        ),
        RunStatus::TotalFailure => format!(
            "None of {} attachments could be retrieved; no archive written",
            result.total()
        ),
    };
    let mut lines = vec![match archive_path {
        Some(path) => format!("{headline} -> {}", path.display()),
        None => headline,
    }];

    let mut failed: Vec<_> = result.failed().iter().collect();
    failed.sort_by_key(|f| f.descriptor().sequence_index());
    for failure in failed {
        let line = format!(
            "  missing: {} ({}): {}",
            failure.descriptor().entry_name(),
            failure.descriptor().id(),
            failure.reason()
        );
        lines.push(truncate_to_width(&line, width));
    }
    lines
}

/// Prints the run summary to stdout.
///
/// Lines are truncated only when stdout is a terminal.
pub fn print_run_summary(result: &RunResult, archive_path: Option<&Path>) {
    let width = if std::io::stdout().is_terminal() {
        terminal_width()
    } else {
        usize::MAX
    };
    for line in run_summary_lines(result, archive_path, width) {
        println!("{line}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use async_trait::async_trait;
    use bundler_core::{
        AttachmentDescriptor, AttachmentFetcher, BulkRetrieval, FetchError, PipelineOptions,
    };

    use super::*;

    struct FailIds(&'static [&'static str]);

    #[async_trait]
    impl AttachmentFetcher for FailIds {
        async fn fetch(&self, id: &str) -> Result<Vec<u8>, FetchError> {
            if self.0.contains(&id) {
                Err(FetchError::http_status(id, 404))
            } else {
                Ok(id.as_bytes().to_vec())
            }
        }
    }

    async fn run_with(failing: &'static [&'static str]) -> RunResult {
        let pipeline =
            BulkRetrieval::new(PipelineOptions::default(), Arc::new(FailIds(failing))).unwrap();
        let descriptors = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, id)| AttachmentDescriptor::new(*id, Some(format!("{id}.pdf")), i))
            .collect();
        pipeline.run(descriptors).await.unwrap()
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("abc", 5), "abc");
        assert_eq!(truncate_to_width("abcdef", 4), "abc…");
        assert_eq!(truncate_to_width("abcdef", 1), "…");
        assert_eq!(truncate_to_width("abcdef", 0), "");
    }

    #[tokio::test]
    async fn test_summary_all_succeeded() {
        let result = run_with(&[]).await;
        let path = PathBuf::from("out.zip");
        let lines = run_summary_lines(&result, Some(&path), 80);
        assert_eq!(lines, vec!["Archived all 3 attachments -> out.zip".to_string()]);
    }

    #[tokio::test]
    async fn test_summary_partial_lists_missing_in_input_order() {
        let result = run_with(&["c", "a"]).await;
        let lines = run_summary_lines(&result, Some(Path::new("out.zip")), 200);
        assert_eq!(lines[0], "Archived 1 of 3 attachments; 2 missing -> out.zip");
        assert!(lines[1].starts_with("  missing: a.pdf (a):"));
        assert!(lines[2].starts_with("  missing: c.pdf (c):"));
    }

    #[tokio::test]
    async fn test_summary_total_failure_without_path() {
        let result = run_with(&["a", "b", "c"]).await;
        let lines = run_summary_lines(&result, None, 200);
        assert_eq!(
            lines[0],
            "None of 3 attachments could be retrieved; no archive written"
        );
        assert_eq!(lines.len(), 4);
    }
}
