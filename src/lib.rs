//! Swrun - an interpreter for serverless workflow task trees
//!
//! Swrun loads workflow definitions written in a subset of the Serverless
//! Workflow DSL and executes their task trees against a JSON state, handing
//! every external call to a pluggable collaborator.

// Public modules
pub mod cli;
pub mod definition;
pub mod error;
pub mod runner;

// Re-export commonly used types
pub use error::{Result, SwrunError};
pub use runner::{Engine, EngineConfig, State, Workflow, WorkflowOutput};

/// Current version of Swrun
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
