//! Input validation utilities
//!
//! Validation functions for command-line parameters, pipeline settings and
//! file paths, all reporting through the structured errors in [`crate::errors`].

use std::fmt::Display;
use std::path::Path;

use crate::errors::{FanoutError, Result};
use crate::input::is_stdin_path;

/// Validate that an input file exists. Stdin (`-`) is always accepted.
///
/// # Errors
/// Returns an error if the file does not exist
///
/// # Example
/// ```
/// use wikifan_lib::validation::validate_file_exists;
///
/// assert!(validate_file_exists("/nonexistent/dump.xml", "Input dump").is_err());
/// assert!(validate_file_exists("-", "Input dump").is_ok());
/// ```
pub fn validate_file_exists<P: AsRef<Path>>(path: P, description: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if !is_stdin_path(path_ref) && !path_ref.exists() {
        return Err(FanoutError::InvalidFileFormat {
            file_type: description.to_string(),
            path: path_ref.display().to_string(),
            reason: "File does not exist".to_string(),
        });
    }
    Ok(())
}

/// Validate that a value is positive (> 0)
///
/// # Errors
/// Returns an error if the value is not positive
///
/// # Example
/// ```
/// use wikifan_lib::validation::validate_positive;
///
/// validate_positive(1000, "report-interval").unwrap();
/// assert!(validate_positive(0, "report-interval").is_err());
/// ```
#[allow(clippy::needless_pass_by_value)]
pub fn validate_positive<T: Ord + Display + Default>(value: T, name: &str) -> Result<()> {
    if value <= T::default() {
        return Err(FanoutError::InvalidParameter {
            parameter: name.to_string(),
            reason: format!("Must be positive (> 0), got: {value}"),
        });
    }
    Ok(())
}

/// Validate that a string parameter is not empty.
///
/// # Errors
/// Returns an error if `value` is empty
pub fn validate_not_empty(value: &str, name: &str) -> Result<()> {
    if value.is_empty() {
        return Err(FanoutError::InvalidParameter {
            parameter: name.to_string(),
            reason: "Must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Validate an identifier namespace: no whitespace or control characters.
///
/// # Errors
/// Returns an error if the namespace cannot prefix an identifier
///
/// # Example
/// ```
/// use wikifan_lib::validation::validate_namespace;
///
/// validate_namespace("http://en.wikipedia.org/wiki/").unwrap();
/// assert!(validate_namespace("urn:my wiki:").is_err());
/// ```
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if let Some(c) = namespace.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(FanoutError::InvalidParameter {
            parameter: "namespace".to_string(),
            reason: format!("Must not contain whitespace or control characters, found {c:?}"),
        });
    }
    Ok(())
}

/// Validate that no two output paths point at the same file.
///
/// # Errors
/// Returns an error naming the first duplicated output
pub fn validate_distinct_outputs<P: AsRef<Path>>(outputs: &[(P, &str)]) -> Result<()> {
    for (i, (path, name)) in outputs.iter().enumerate() {
        if let Some((_, other)) = outputs[..i].iter().find(|(p, _)| p.as_ref() == path.as_ref()) {
            return Err(FanoutError::InvalidParameter {
                parameter: (*name).to_string(),
                reason: format!("Same path as {other}: {}", path.as_ref().display()),
            });
        }
    }
    Ok(())
}
