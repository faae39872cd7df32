//! Error types for ci-checkout

use thiserror::Error;

/// Result type alias for checkout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for checkout operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// libgit2 error while inspecting a repository
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),

    /// A required input was empty or absent
    #[error("Input required and not supplied: {0}")]
    MissingInput(&'static str),

    /// An input still carries `${...}` template syntax
    #[error(
        "Input '{field}' contains an unresolved placeholder: {value}. \
         Check the variable substitution of the calling workflow."
    )]
    UnresolvedPlaceholder {
        /// Name of the input
        field: &'static str,
        /// Raw value as received
        value: String,
    },

    /// An input had a spelling outside its accepted set
    #[error("Invalid value '{value}' for input '{field}'. Expected one of: {expected}")]
    InvalidInput {
        /// Name of the input
        field: &'static str,
        /// Raw value as received
        value: String,
        /// Accepted spellings
        expected: &'static str,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external git invocation exited unsuccessfully
    #[error("`{command}` failed ({status}): {stderr}")]
    Git {
        /// Masked command line
        command: String,
        /// Exit status description
        status: String,
        /// Masked standard error
        stderr: String,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Run-and-forget wrapper for steps whose failure must not abort the checkout
///
/// The failure is logged as a warning and discarded; the success value, if
/// any, is handed back.
pub fn best_effort<T, E: std::fmt::Display>(
    step: &str,
    result: std::result::Result<T, E>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("{} failed (ignored): {}", step, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_effort() {
        assert_eq!(best_effort::<_, Error>("noop", Ok(3)), Some(3));
        assert_eq!(
            best_effort::<u8, _>("probe", Err(Error::Other("offline".to_string()))),
            None
        );
    }

    #[test]
    fn test_missing_input_message() {
        let err = Error::MissingInput("repository");
        assert_eq!(err.to_string(), "Input required and not supplied: repository");
    }
}
