use serde::de::DeserializeOwned;
use std::fs;

use crate::error::{Error, Result};

/// Parses a JSON file into a given type `T`.
///
/// This function reads a file from `file_path`, attempts to parse it
/// as JSON, and returns an instance of `T`.
///
/// Errors are automatically converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let data = fs::read_to_string(file_path).map_err(|e| Error::IoError(e))?;

    let parsed_data: T = serde_json::from_str(&data).map_err(|e| Error::DeserializationError(e))?;

    Ok(parsed_data)
}

/// Parses a JSON string into a given type `T`.
///
/// Used for documents that arrive over a connection rather than from disk,
/// e.g. the status output of a cluster host.
pub fn parse_json_str<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let parsed_data: T = serde_json::from_str(raw).map_err(|e| Error::DeserializationError(e))?;

    Ok(parsed_data)
}
