//! CLI entry point for the batchfetch tool.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use batchfetch_core::{
    Completion, ExecuteOutcome, FileConfig, HttpTransport, Method, Outcome, ProcessParams,
    RequestEngine, config,
};
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, CheckArgs, Command, FetchArgs};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = config::load(args.config.as_deref()).context("Failed to load config")?;
    debug!(?file_config, "configuration resolved");

    match args.command {
        Command::Fetch(fetch) => run_fetch(&file_config, fetch).await,
        Command::Check(check) => run_check(&file_config, check).await,
    }
}

fn build_engine(file_config: &FileConfig) -> RequestEngine {
    RequestEngine::new(
        file_config.to_engine_config(),
        Arc::new(HttpTransport::new()),
        file_config.proxy_source(),
    )
}

/// URLs from the command line, or one per stdin line when none were given.
fn collect_urls(from_args: Vec<String>) -> Result<Vec<String>> {
    if !from_args.is_empty() {
        return Ok(from_args);
    }
    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read URLs from stdin")?;
    Ok(buffer
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Turns the `--data` argument into a payload.
///
/// JSON objects are kept structured so they can be form-encoded; anything
/// else is sent as typed unless `--json` asks for a JSON value.
fn parse_data(raw: String, as_json: bool) -> Value {
    match serde_json::from_str::<Value>(&raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(value) if as_json => value,
        _ => Value::String(raw),
    }
}

async fn run_fetch(file_config: &FileConfig, fetch: FetchArgs) -> Result<ExitCode> {
    let urls = collect_urls(fetch.urls)?;
    if urls.is_empty() {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/' | batchfetch fetch");
        return Ok(ExitCode::SUCCESS);
    }

    let Some(method) = Method::parse(&fetch.method) else {
        bail!("Unsupported HTTP method '{}'", fetch.method);
    };

    let mut engine = build_engine(file_config);
    if let Some(window) = fetch.window {
        engine.config_mut().window_size = usize::from(window);
    }
    engine.config_mut().merge_headers(fetch.headers);

    let params = ProcessParams {
        method,
        data: fetch.data.map(|raw| parse_data(raw, fetch.json)),
        as_json: fetch.json,
        auth: fetch.user,
        callback: None,
        file_sink: fetch.output,
        timeout: fetch.timeout.map(Duration::from_secs),
    };

    info!(urls = urls.len(), %method, "Fetching");
    let outcome = engine
        .process(&urls, params)
        .await
        .context("Batch could not be run")?;

    let ExecuteOutcome::Batch(batch) = outcome else {
        return Ok(ExitCode::SUCCESS);
    };
    if let Completion::Aborted { reason } = batch.completion() {
        warn!(%reason, "Batch ended early, results are partial");
    }

    for (index, outcome) in batch.outcomes() {
        let Outcome::Response(record) = outcome else {
            continue;
        };
        match record.output.error() {
            Some(error) => println!("{index}\tERR\t0\t{}\t{error}", record.metadata.url),
            None => println!(
                "{index}\t{}\t{}\t{}",
                record.metadata.status.unwrap_or_default(),
                record.metadata.content_length,
                record.metadata.url
            ),
        }
    }

    info!(
        stored = batch.len(),
        failed = batch.failures(),
        "Fetch complete"
    );
    Ok(if batch.is_complete() && batch.failures() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_check(file_config: &FileConfig, check: CheckArgs) -> Result<ExitCode> {
    let urls = collect_urls(check.urls)?;
    if urls.is_empty() {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut engine = build_engine(file_config);
    let available = engine
        .is_available(&urls)
        .await
        .context("Availability check could not be run")?;

    for (url, up) in urls.iter().zip(&available) {
        println!("{}\t{url}", if *up { "up" } else { "down" });
    }

    let down = available.iter().filter(|up| !**up).count();
    info!(checked = urls.len(), down, "Check complete");
    Ok(if down == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
