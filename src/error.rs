//! Error handling for Netgraft
//!
//! Every error names the offending layer ordinal(s) and the rule that was
//! violated, so a bad plan can be diagnosed without inspecting internals.

use thiserror::Error;

/// Result type alias for Netgraft operations
pub type Result<T> = std::result::Result<T, GraftError>;

/// Main error type for Netgraft operations
#[derive(Error, Debug)]
pub enum GraftError {
    // Plan Errors
    #[error("Invalid plan at layer {ordinal}: {reason}")]
    InvalidPlan { ordinal: usize, reason: String },

    #[error("Conflicting edits on layers {ordinals:?}: {reason}")]
    ConflictingEdit { ordinals: Vec<usize>, reason: String },

    // Initialization Errors
    #[error("Unsupported weight init scheme '{scheme}': {reason}")]
    UnsupportedScheme { scheme: String, reason: String },

    // Layout Errors
    #[error("Shape mismatch in {location}: expected {expected}, found {actual}")]
    ShapeMismatch {
        location: String,
        expected: usize,
        actual: usize,
    },

    #[error("Layer ordinal {ordinal} out of range for a topology of {len} layers")]
    IndexOutOfRange { ordinal: usize, len: usize },

    #[error("Invalid topology: {reason}")]
    InvalidTopology { reason: String },

    // Configuration Errors
    #[error("Invalid layer configuration for '{key}': {reason}")]
    InvalidConfiguration { key: String, reason: String },

    #[error("Unsupported layer configuration: {reason}")]
    UnsupportedConfiguration { reason: String },

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraftError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            GraftError::InvalidPlan { .. } => "INVALID_PLAN",
            GraftError::ConflictingEdit { .. } => "CONFLICTING_EDIT",
            GraftError::UnsupportedScheme { .. } => "UNSUPPORTED_SCHEME",
            GraftError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            GraftError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            GraftError::InvalidTopology { .. } => "INVALID_TOPOLOGY",
            GraftError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            GraftError::UnsupportedConfiguration { .. } => "UNSUPPORTED_CONFIGURATION",
            GraftError::FileNotFound { .. } => "FILE_NOT_FOUND",
            GraftError::Io(_) => "IO_ERROR",
            GraftError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable by editing the request
    ///
    /// Shape mismatches mean the layout bookkeeping itself is broken and
    /// are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            GraftError::InvalidPlan { .. } => true,
            GraftError::ConflictingEdit { .. } => true,
            GraftError::UnsupportedScheme { .. } => true,
            GraftError::InvalidConfiguration { .. } => true,
            GraftError::UnsupportedConfiguration { .. } => true,
            GraftError::FileNotFound { .. } => true,
            _ => false,
        }
    }

    /// Ordinals this error refers to, if any
    pub fn ordinals(&self) -> Vec<usize> {
        match self {
            GraftError::InvalidPlan { ordinal, .. } => vec![*ordinal],
            GraftError::ConflictingEdit { ordinals, .. } => ordinals.clone(),
            GraftError::IndexOutOfRange { ordinal, .. } => vec![*ordinal],
            _ => vec![],
        }
    }

    pub(crate) fn invalid_plan(ordinal: usize, reason: impl Into<String>) -> Self {
        GraftError::InvalidPlan {
            ordinal,
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(ordinals: Vec<usize>, reason: impl Into<String>) -> Self {
        GraftError::ConflictingEdit {
            ordinals,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = GraftError::invalid_plan(3, "ordinal beyond pop point");
        assert_eq!(err.error_code(), "INVALID_PLAN");
        assert_eq!(err.ordinals(), vec![3]);
    }

    #[test]
    fn test_conflict_message_names_ordinals() {
        let err = GraftError::conflict(vec![1, 2], "tried to resize frozen layer 1");
        let msg = err.to_string();
        assert!(msg.contains("[1, 2]"));
        assert!(msg.contains("frozen layer 1"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_shape_mismatch_not_recoverable() {
        let err = GraftError::ShapeMismatch {
            location: "layer 2".to_string(),
            expected: 10,
            actual: 12,
        };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("layer 2"));
    }
}
