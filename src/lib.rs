//! agentrun: client-side orchestrator for asynchronous remote agent runs.
//!
//! Posts a message to a conversation thread, starts a run of a remote agent,
//! polls it to completion, executes locally registered tools when the
//! service asks for their output, answers approval requests, and recovers
//! runs that never leave the queue. Every call ends in a [`RunReport`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use agentrun::prelude::*;
//!
//! # async fn example() -> agentrun::error::Result<()> {
//! let config = OrchestratorConfig::from_env()?;
//! let mut tools = ToolRegistry::new();
//! tools.register("lookup", |args: &ToolArguments| {
//!     Ok(serde_json::json!({ "query": args.get_str("query")? }))
//! });
//!
//! let controller = RunController::from_config(&config, Arc::new(tools))?;
//! let request = controller.request("thread_1", "agent_1", "Hello!");
//! let report = controller.execute(request, CancellationToken::new()).await;
//! println!("{:?}", report.final_answer);
//! # Ok(())
//! # }
//! ```
//!
//! [`RunReport`]: agent_loop::RunReport

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod prelude;
pub mod tools;
pub mod transport;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
