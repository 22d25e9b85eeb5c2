//! Common test utilities

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use swrun::definition::parse_definition;
use swrun::Workflow;
use tempfile::TempDir;

/// Wrap a `do:` block in a minimal document header
pub fn document(name: &str, body: &str) -> String {
    format!(
        "document:\n  dsl: 1.0.0\n  namespace: tests\n  name: {}\n  version: 1.0.0\n{}",
        name, body
    )
}

/// Parse, validate and convert a workflow from YAML
pub fn workflow(yaml: &str) -> Workflow {
    let definition = parse_definition(yaml).unwrap();
    Workflow::from_definition(&definition).unwrap()
}

/// Create a temporary directory holding a single file
pub fn create_test_file(name: &str, content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    fs::write(&path, content).unwrap();
    (temp_dir, path)
}

/// Add another file to an existing temporary directory
pub fn add_test_file(temp_dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = temp_dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Path of a bundled demo workflow
pub fn demo_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}
