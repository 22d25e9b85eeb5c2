//! Workflow execution
//!
//! This module handles running task trees: the execution state, expression
//! evaluation, the task model, dispatch per task kind, fork branches and
//! external calls.

pub mod call;
mod dispatch;
pub mod engine;
pub mod expression;
pub mod fork;
pub mod interpolate;
pub mod state;
pub mod task;

// Re-export main types
pub use call::*;
pub use engine::*;
pub use expression::*;
pub use fork::*;
pub use interpolate::*;
pub use state::*;
pub use task::*;
