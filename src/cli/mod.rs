//! CLI entry point for agentrun.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Drive remote agent runs from the terminal
#[derive(Parser, Debug)]
#[command(name = "agentrun", version, about = "Orchestrate remote agent runs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Post a message, run an agent on it and print the report as JSON
    Run(RunArgs),
    /// List the built-in tools
    Tools,
}

/// Arguments for `agentrun run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Agent (assistant) id to run
    #[arg(short, long)]
    pub agent: String,

    /// Existing thread id; a new thread is created when omitted
    #[arg(short, long)]
    pub thread: Option<String>,

    /// Config file (defaults to ~/.agentrun/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Service endpoint, overrides config and environment
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Seconds a run may stay queued before it is recreated
    #[arg(long, value_name = "SECS")]
    pub queued_timeout: Option<u64>,

    /// Recreations allowed for runs stuck in the queue
    #[arg(long, value_name = "N")]
    pub max_run_retries: Option<u32>,

    /// Total polls before giving up
    #[arg(long, value_name = "N")]
    pub max_poll_iterations: Option<u32>,

    /// Print the report on one line
    #[arg(long)]
    pub compact: bool,

    /// User message (positional)
    pub message: String,
}
