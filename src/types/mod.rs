//! Core types for agentrun.

pub mod run;
pub mod usage;

pub use run::*;
pub use usage::*;
