//! Error types for wmibeat-provider

use thiserror::Error;

use crate::provider::HandleKind;

/// Errors that can occur while talking to the management provider
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Process-wide or per-thread interop initialization failed
    #[error("provider initialization failed: {0}")]
    Initialization(String),

    /// Failed to create the provider locator
    #[error("failed to create locator: {0}")]
    Locator(String),

    /// Failed to connect to the namespace
    #[error("connection to namespace {namespace} failed: {message}")]
    Connection {
        /// Namespace that was requested
        namespace: String,
        /// Provider message
        message: String,
    },

    /// Query execution failed
    #[error("query execution failed: {0}")]
    Execution(String),

    /// Result enumeration failed (count or row access)
    #[error("result enumeration failed: {0}")]
    Enumeration(String),

    /// A named property could not be read from a row
    #[error("unable to read property {field}: {message}")]
    FieldAccess {
        /// Property name
        field: String,
        /// Provider message
        message: String,
    },

    /// A handle of the wrong kind, or one unknown to the provider, was used
    #[error("invalid {kind} handle {id}")]
    InvalidHandle {
        /// Expected handle kind
        kind: HandleKind,
        /// Handle id
        id: u64,
    },
}

impl ProviderError {
    /// Check if the error aborts the whole tick
    ///
    /// Only field access failures are scoped to a single field of a single row.
    #[must_use]
    pub fn aborts_tick(&self) -> bool {
        !matches!(self, ProviderError::FieldAccess { .. })
    }
}
