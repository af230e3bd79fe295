//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Run batches of HTTP requests with a bounded number in flight.
///
/// Batchfetch sends every URL as one batch, keeps at most WINDOW requests
/// open at once and prints results in the order the URLs were given.
#[derive(Parser, Debug)]
#[command(name = "batchfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (defaults to ~/.config/batchfetch/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch every URL and print status and size per URL
    Fetch(FetchArgs),
    /// Probe every URL and print up/down per URL
    Check(CheckArgs),
}

#[derive(ClapArgs, Debug)]
pub struct FetchArgs {
    /// URLs to fetch (read from stdin when omitted)
    pub urls: Vec<String>,

    /// Maximum requests in flight (2-100)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(2..=100))]
    pub window: Option<u16>,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request body shared by every URL (JSON object for form or JSON mode)
    #[arg(short, long)]
    pub data: Option<String>,

    /// Send the body as JSON
    #[arg(long)]
    pub json: bool,

    /// Basic auth credentials as USER:PASS
    #[arg(short, long)]
    pub user: Option<String>,

    /// Append response bodies to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Per-request timeout in seconds (1-86400)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub timeout: Option<u64>,

    /// Extra request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,
}

#[derive(ClapArgs, Debug)]
pub struct CheckArgs {
    /// URLs to probe (read from stdin when omitted)
    pub urls: Vec<String>,
}
