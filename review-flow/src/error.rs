use thiserror::Error;

use crate::models::DocumentStatus;

/// Errors raised by the conversation engine and the review queue
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid transition for document {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("Ingest conflict for document {id}: already {existing}")]
    IngestConflict { id: String, existing: DocumentStatus },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("Conversation script has no steps")]
    EmptyScript,

    #[error("Step execution failed: {0}")]
    StepExecutionFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Document source error: {0}")]
    SourceError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Script parse error: {0}")]
    ScriptParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    pub fn document_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Document",
            id: id.into(),
        }
    }

    pub fn patient_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Patient",
            id: id.into(),
        }
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Session",
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
