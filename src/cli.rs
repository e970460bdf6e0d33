//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Bulk-download service appointment attachments into one zip archive.
///
/// Reads a JSON attachment list (a bare array or a `{"data": [...]}` envelope),
/// fetches every attachment through the dashboard file proxy, and writes the
/// ones that arrived into a single archive. Exit code 0 means everything was
/// archived, 1 means some attachments are missing, 2 means none could be
/// retrieved.
#[derive(Parser, Debug)]
#[command(name = "attachment-bundler")]
#[command(author, version, about)]
pub struct Args {
    /// Attachment list JSON file (reads stdin when omitted)
    pub input: Option<PathBuf>,

    /// Path of the zip archive to write
    #[arg(short, long, default_value = "attachments.zip")]
    pub output: PathBuf,

    /// Base URL of the attachment proxy route; ids are appended as a path segment
    #[arg(short = 'u', long)]
    pub base_url: Option<String>,

    /// Maximum concurrent fetches (1-100, default 6)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Fail any single fetch that takes longer than this many seconds (1-3600)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub fetch_timeout: Option<u64>,

    /// Keep attachments with colliding names as "name (2).ext" instead of overwriting
    #[arg(long)]
    pub dedupe_names: bool,

    /// Also write a JSON manifest of archived and missing attachments
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Ignore the user config file
    #[arg(long)]
    pub no_config: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["attachment-bundler"]).unwrap();
        assert!(args.input.is_none());
        assert_eq!(args.output, PathBuf::from("attachments.zip"));
        assert!(args.concurrency.is_none());
        assert!(args.fetch_timeout.is_none());
        assert!(!args.dedupe_names);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_positional_input_and_output() {
        let args =
            Args::try_parse_from(["attachment-bundler", "list.json", "-o", "out/bundle.zip"])
                .unwrap();
        assert_eq!(args.input, Some(PathBuf::from("list.json")));
        assert_eq!(args.output, PathBuf::from("out/bundle.zip"));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["attachment-bundler", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let result = Args::try_parse_from(["attachment-bundler", "-q", "-v"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        let args = Args::try_parse_from(["attachment-bundler", "-c", "100"]).unwrap();
        assert_eq!(args.concurrency, Some(100));

        for value in ["0", "101"] {
            let err = Args::try_parse_from(["attachment-bundler", "-c", value]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_fetch_timeout_bounds() {
        let args = Args::try_parse_from(["attachment-bundler", "--fetch-timeout", "90"]).unwrap();
        assert_eq!(args.fetch_timeout, Some(90));

        let err = Args::try_parse_from(["attachment-bundler", "-t", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_flags() {
        let args = Args::try_parse_from([
            "attachment-bundler",
            "--dedupe-names",
            "--no-progress",
            "--no-config",
            "--manifest",
            "run.json",
            "--base-url",
            "http://localhost:3000/api/attachments",
        ])
        .unwrap();
        assert!(args.dedupe_names);
        assert!(args.no_progress);
        assert!(args.no_config);
        assert_eq!(args.manifest, Some(PathBuf::from("run.json")));
        assert_eq!(
            args.base_url.as_deref(),
            Some("http://localhost:3000/api/attachments")
        );
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["attachment-bundler", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["attachment-bundler", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
