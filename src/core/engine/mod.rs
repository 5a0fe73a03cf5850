//! Deployment execution.
//!
//! - `context` - Per-run values captured from the operator's environment
//! - `executor` - Local command execution
//! - `pipeline` - Task sequencing, host fan-out, fail-fast abort

pub mod context;
pub mod executor;
pub mod pipeline;

pub use context::ExecutionContext;
pub use executor::{LocalExecutor, ShellExecutor};
pub use pipeline::{
    Engine, ExecutionResult, PipelineResult, PipelineSummary, PlannedTask, TaskOutcome, TaskState,
};
