//! JSON I/O handling for CLI
//!
//! - Input: JSON files named on the command line
//! - Output: single JSON object via stdout
//! - UTF-8 only

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read and deserialize a JSON file
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| CliError::io_error(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| CliError::invalid_input(format!("Invalid JSON in {}: {}", path.display(), e)))
}

/// Build the success envelope around `data`
pub fn response(data: Value) -> Value {
    serde_json::json!({
        "status": "ok",
        "data": data
    })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response(data))?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestDefinition;

    #[test]
    fn test_read_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"salt": "buttons"}}"#).unwrap();
        let definition: TestDefinition = read_json_file(file.path()).unwrap();
        assert_eq!(definition.salt, "buttons");
    }

    #[test]
    fn test_invalid_json_is_invalid_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{").unwrap();
        let err = read_json_file::<TestDefinition>(file.path()).unwrap_err();
        assert_eq!(err.code_str(), "PROCTOR_CLI_INVALID_INPUT");
    }

    #[test]
    fn test_response_envelope() {
        let value = response(serde_json::json!({"allocation_only": true}));
        assert_eq!(value["status"], "ok");
        assert_eq!(value["data"]["allocation_only"], true);
    }
}
