//! Local tools the run can ask the client to execute.

pub mod arguments;
pub mod builtin;
pub mod registry;
pub mod tool;

pub use arguments::ToolArguments;
pub use registry::{ResultFormat, ToolRegistry};
pub use tool::{AgentTool, FunctionTool, Tool, ToolExecutionContext};
