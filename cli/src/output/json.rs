//! JSON output helpers.
//!
//! Error objects for failed `--json` runs, and the run summary printed
//! once an instance has exited.

use anyhow::{Context, Result};
use unirun_common::Instance;

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Format the final state of a finished instance.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_instance(instance: &Instance) -> Result<String> {
    serde_json::to_string_pretty(instance).context("JSON serialization failed")
}
