//! Layered error definitions
//!
//! Categorized by source: argument / lookup / descriptor / persistence / state / config

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Input Errors =====
    /// Null or garbage input to a buffer or source operation
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Unknown factory, device type or source row
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    // ===== Session Errors =====
    /// Malformed recording descriptor or recording layout
    #[error("corrupt recording at '{path}': {message}")]
    Corrupt { path: String, message: String },

    /// A save attempt failed (never fatal to ingestion)
    #[error("failed to persist item for '{source_name}': {message}")]
    PersistFailure {
        source_name: String,
        message: String,
    },

    /// Operation not allowed in the manager's current mode
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    // ===== Device Errors =====
    /// Device-specific update or acquisition failure
    #[error("device '{device}' error: {message}")]
    Device { device: String, message: String },

    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create not found error
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create corrupt recording error
    pub fn corrupt(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create persist failure error
    pub fn persist_failure(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PersistFailure {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create device error
    pub fn device(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Device {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, ContractError>;
