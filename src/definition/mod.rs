//! Workflow definition loading and validation
//!
//! This module handles parsing of workflow documents (YAML or JSON)
//! and validation of their structure.

pub mod parse;
pub mod schema;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use types::*;
