//! Error types for rust-schemaupgrade

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while planning a schema upgrade.
///
/// Every fatal condition is raised during reconcile/diff/translate,
/// strictly before any statement would be executed.
#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("Conflicting hints: {message}")]
    HintConflict { message: String },

    #[error("Hint references unknown {kind} '{name}' in the {model} model")]
    UnresolvedReference {
        kind: &'static str,
        name: String,
        model: &'static str,
    },

    #[error("Copy hint '{source_path}' -> '{target}' is structurally incompatible: {message}")]
    StructuralIncompatibility {
        source_path: String,
        target: String,
        message: String,
    },

    #[error("Cannot remove locked object '{path}': {reason}")]
    LockedObject { path: String, reason: String },

    #[error("Upgrade contains {count} unsafe action(s) and the safe upgrade mode forbids them")]
    UnsafeActionsRejected { count: usize, details: Vec<String> },

    #[error("Path '{path}' does not resolve in the {model} model")]
    PathNotFound { path: String, model: &'static str },

    #[error("Duplicate node path '{path}' in model '{model}'")]
    DuplicatePath { path: String, model: String },

    #[error("Failed to parse expression '{expression}'")]
    ExpressionParse {
        expression: String,
        #[source]
        source: sqlparser::parser::ParserError,
    },

    #[error("Failed to read model file: {path}")]
    ModelReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model file: {path}")]
    ModelParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl UpgradeError {
    /// Shorthand for a hint-conflict error with a formatted message.
    pub fn conflict(message: impl Into<String>) -> Self {
        UpgradeError::HintConflict {
            message: message.into(),
        }
    }
}
