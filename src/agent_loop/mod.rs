//! Run orchestration: polling, action dispatch, approvals and diagnostics.

pub mod approvals;
pub mod backoff;
pub mod diagnostics;
pub mod dispatcher;
pub mod events;
pub mod runner;
pub mod types;

pub use approvals::*;
pub use backoff::*;
pub use diagnostics::*;
pub use dispatcher::*;
pub use events::*;
pub use runner::*;
pub use types::*;
