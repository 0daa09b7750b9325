//! agentrun CLI binary entry point.

use std::sync::Arc;
use std::time::Duration;

use agentrun::agent_loop::{RunController, RunOutcome};
use agentrun::cli::{Cli, Commands, RunArgs};
use agentrun::config::OrchestratorConfig;
use agentrun::transport::{HttpTransport, RunTransport};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => handle_run(args).await,
        Commands::Tools => {
            for (name, description) in agentrun::tools::builtin::registry().describe() {
                println!("{name:<16} {description}");
            }
            Ok(RunOutcome::Completed)
        }
    };

    match result {
        Ok(outcome) if outcome.is_success() => {}
        Ok(_) => std::process::exit(2),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn handle_run(args: RunArgs) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let mut config = OrchestratorConfig::load(args.config.as_deref())?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = Some(endpoint);
    }
    if let Some(secs) = args.queued_timeout {
        config.run.queued_timeout = Duration::from_secs(secs);
    }
    if let Some(n) = args.max_run_retries {
        config.run.max_run_retries = n;
    }
    if let Some(n) = args.max_poll_iterations {
        config.run.max_poll_iterations = n;
    }

    let transport: Arc<dyn RunTransport> = Arc::new(HttpTransport::new(&config)?);
    let thread_id = match args.thread {
        Some(thread) => thread,
        None => transport.create_thread().await?,
    };

    let registry = Arc::new(agentrun::tools::builtin::registry());
    let controller =
        RunController::new(transport, registry).with_run_config(config.run.clone());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling run...");
            on_ctrl_c.cancel();
        }
    });

    let request = controller.request(thread_id, args.agent, args.message);
    let report = controller.execute(request, cancel).await;

    let json = if args.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{json}");

    Ok(report.outcome)
}
