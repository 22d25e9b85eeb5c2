//! Definition file parsing

use crate::definition::types::Definition;
use crate::error::{DefinitionError, Result};
use std::fs;
use std::path::Path;

/// Parse a definition file from a path
pub fn parse_definition_file(path: &Path) -> Result<Definition> {
    let contents = fs::read_to_string(path).map_err(|e| DefinitionError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    parse_definition(&contents)
}

/// Parse a definition from a string
///
/// JSON documents are accepted too, since JSON is valid YAML.
pub fn parse_definition(source: &str) -> Result<Definition> {
    let definition: Definition = serde_yaml::from_str(source)?;
    Ok(definition)
}
