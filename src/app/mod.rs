//! Application runtime: config resolution, input, pipeline run, and output.

pub(crate) mod config;
pub(crate) mod exit_handler;
pub(crate) mod progress_ui;
pub(crate) mod terminal;

use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bundler_core::bundle::{CONNECT_TIMEOUT_SECS, DEFAULT_MAX_ATTACHMENT_BYTES, READ_TIMEOUT_SECS};
use bundler_core::{
    BulkRetrieval, DEFAULT_CONCURRENCY, DuplicateNamePolicy, HttpFetcher, HttpFetcherConfig,
    PipelineOptions, RunManifest, RunResult, RunStatus, parse_descriptors,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::Args;
use crate::output;
use config::FileConfig;
use exit_handler::ProcessExit;
use progress_ui::ProgressUi;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Runs one bundling invocation and returns its exit outcome.
pub(crate) async fn run(args: Args) -> Result<ProcessExit> {
    let file_config = if args.no_config {
        FileConfig::default()
    } else {
        config::load_default_file_config()?.unwrap_or_default()
    };

    let default_level = resolve_default_log_level(&args, &file_config);
    let no_color = terminal::no_color_env_requested() || terminal::is_dumb_terminal();
    terminal::init_tracing(default_level, false, no_color);
    debug!(?args, "CLI arguments parsed");

    let Some(input_text) = read_input(&args)? else {
        output::print_input_guidance();
        bail!("no attachment list provided");
    };
    let descriptors = parse_descriptors(&input_text).context("Invalid attachment list")?;
    info!(attachments = descriptors.len(), "Parsed attachment list");

    let cancel = CancellationToken::new();
    let pipeline = build_pipeline(&args, &file_config, cancel.clone())?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling outstanding fetches");
            cancel.cancel();
        }
    });

    let show_progress = terminal::should_show_progress(
        io::stderr().is_terminal(),
        args.quiet,
        args.no_progress,
        terminal::is_dumb_terminal(),
    );
    let total = descriptors.len();
    let result = if show_progress {
        let ui = ProgressUi::new(total);
        let result = pipeline.run_with_progress(descriptors, ui.callback()).await;
        ui.finish();
        result?
    } else {
        pipeline.run(descriptors).await?
    };

    finish_run(&args, &result).await
}

async fn finish_run(args: &Args, result: &RunResult) -> Result<ProcessExit> {
    let written_path = match result.archive() {
        Some(archive) => {
            write_archive(&args.output, archive.bytes()).await?;
            info!(
                path = %args.output.display(),
                entries = archive.entry_count(),
                bytes = archive.bytes().len(),
                "Archive written"
            );
            Some(args.output.as_path())
        }
        None => None,
    };

    if let Some(manifest_path) = &args.manifest {
        let manifest = RunManifest::from_result(result).to_json_pretty()?;
        tokio::fs::write(manifest_path, manifest)
            .await
            .with_context(|| format!("Failed to write manifest '{}'", manifest_path.display()))?;
        debug!(path = %manifest_path.display(), "Manifest written");
    }

    if !args.quiet || result.status() != RunStatus::AllSucceeded {
        output::print_run_summary(result, written_path);
    }
    Ok(exit_handler::determine_exit_outcome(result.status()))
}

async fn write_archive(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write archive '{}'", path.display()))
}

/// Reads the attachment list from the input file, or stdin when piped.
///
/// Returns `None` when there is no file and stdin is interactive.
fn read_input(args: &Args) -> Result<Option<String>> {
    if let Some(path) = &args.input {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read attachment list '{}'", path.display()))?;
        return Ok(Some(text));
    }
    if io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read attachment list from stdin")?;
    Ok(Some(buffer))
}

/// Log level from CLI flags, then the config file, then `info`.
fn resolve_default_log_level(args: &Args, file_config: &FileConfig) -> &'static str {
    if args.quiet {
        return "error";
    }
    match args.verbose {
        0 => file_config
            .verbosity
            .map_or("info", config::VerbositySetting::level),
        1 => "debug",
        _ => "trace",
    }
}

/// Merges CLI flags over the config file and builds the pipeline.
fn build_pipeline(
    args: &Args,
    file_config: &FileConfig,
    cancel: CancellationToken,
) -> Result<BulkRetrieval> {
    let Some(base_url) = args.base_url.as_ref().or(file_config.base_url.as_ref()) else {
        bail!(
            "no attachment proxy URL configured; pass --base-url or set `base_url` in the config file"
        );
    };

    let connect = file_config
        .connect_timeout_secs
        .unwrap_or(CONNECT_TIMEOUT_SECS);
    let read = file_config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS);
    let max_bytes = file_config
        .max_attachment_mb
        .map_or(DEFAULT_MAX_ATTACHMENT_BYTES, |mb| mb.saturating_mul(BYTES_PER_MIB));

    let mut fetcher_config = HttpFetcherConfig::new(base_url)?
        .with_timeouts(Duration::from_secs(connect), Duration::from_secs(read))
        .with_max_attachment_bytes(max_bytes);
    if let Some(token) = config::token_from_env() {
        debug!("Using bearer token from {}", config::TOKEN_ENV_VAR);
        fetcher_config = fetcher_config.with_bearer_token(token);
    }
    let fetcher = HttpFetcher::new(fetcher_config)?;

    let concurrency = args
        .concurrency
        .or(file_config.concurrency)
        .map_or(DEFAULT_CONCURRENCY, usize::from);
    let duplicate_names = if args.dedupe_names {
        DuplicateNamePolicy::Suffix
    } else {
        file_config.duplicate_names.unwrap_or_default()
    };

    let mut options = PipelineOptions::default()
        .with_concurrency(concurrency)
        .with_duplicate_names(duplicate_names)
        .with_cancellation(cancel);
    if let Some(secs) = args.fetch_timeout.or(file_config.fetch_timeout_secs) {
        options = options.with_fetch_timeout(Duration::from_secs(secs));
    }
    debug!(
        concurrency,
        ?duplicate_names,
        fetch_timeout = ?options.fetch_timeout(),
        "Pipeline configured"
    );

    Ok(BulkRetrieval::new(options, Arc::new(fetcher))?)
}
