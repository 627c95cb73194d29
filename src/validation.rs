//! Local checks applied to write requests before they are sent.
//!
//! The backend rejects the same inputs; checking them here gives the operator the error
//! without a round trip and keeps malformed bodies off the wire.

use crate::error::{AppResult, DashboardError};
use crate::models::WriteRequest;
use once_cell::sync::Lazy;
use regex::Regex;

/// Posix path with an extension and no trailing slash, as accepted by the writer.
static OUTPUT_FILE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^/[a-zA-Z0-9_/-]*\..+[^/]$").ok());

/// Validates that at least one image is requested.
///
/// # Returns
///
/// * `Ok(())` if `n_images >= 1`.
/// * `Err(&'static str)` otherwise.
pub fn is_valid_n_images(n_images: u64) -> Result<(), &'static str> {
    if n_images >= 1 {
        Ok(())
    } else {
        Err("n_images must be an integer >= 1")
    }
}

/// Validates an output file path.
///
/// # Arguments
///
/// * `path` - The absolute path of the file the writer should create.
///
/// # Returns
///
/// * `Ok(())` if the path is absolute and a valid posix file path.
/// * `Err(&'static str)` describing the first violated rule.
pub fn is_valid_output_file(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("Output file cannot be empty");
    }
    if !path.starts_with('/') {
        return Err("Output file must be an absolute path starting with '/'");
    }
    match OUTPUT_FILE_PATTERN.as_ref() {
        Some(pattern) if pattern.is_match(path) => Ok(()),
        _ => Err("Output file must be a valid posix path with a file extension"),
    }
}

/// Joins an output folder and a run id into the writer's file name, `{folder}/{run_id}.h5`.
pub fn output_file_for(folder: &str, run_id: u64) -> String {
    format!("{}/{}.h5", folder.trim_end_matches('/'), run_id)
}

/// Validates a complete write request.
pub fn validate_write_request(request: &WriteRequest) -> AppResult<()> {
    is_valid_n_images(request.n_images)
        .map_err(|e| DashboardError::InvalidWriteRequest(e.to_string()))?;
    is_valid_output_file(&request.output_file).map_err(|e| {
        DashboardError::InvalidWriteRequest(format!("{} (got '{}')", e, request.output_file))
    })?;
    Ok(())
}
