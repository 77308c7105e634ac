//! Core error types for wmibeat-core

use thiserror::Error;
use wmibeat_provider::ProviderError;

/// Errors raised by the polling engine
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Query configuration is unusable; the query is dropped
    #[error("configuration error for class {class}: {message}")]
    Configuration {
        /// Configured class
        class: String,
        /// What is wrong
        message: String,
    },

    /// Provider connection failed; aborts the current tick
    #[error("connection to namespace {namespace} failed: {message}")]
    Connection {
        /// Namespace that was requested
        namespace: String,
        /// Provider message
        message: String,
    },

    /// Query execution or result enumeration failed; aborts the current tick
    #[error("query execution failed: {0}")]
    Execution(String),

    /// A field could not be read from a row; the field is skipped
    #[error("unable to read field {field}: {message}")]
    FieldAccess {
        /// Field name
        field: String,
        /// Provider message
        message: String,
    },

    /// An integer-hinted field holds a non-integer value; the field is skipped
    #[error("field {field}: {value} is not an integer")]
    Coercion {
        /// Field name
        field: String,
        /// Offending value as text
        value: String,
    },

    /// No sink could be obtained for a query at startup
    #[error("sink unavailable for class {class}: {message}")]
    Sink {
        /// Configured class
        class: String,
        /// Sink message
        message: String,
    },

    /// Provider interop or worker thread failure
    #[error("provider error: {0}")]
    Provider(String),
}

impl CoreError {
    /// Check if the error aborts a whole tick rather than a single field
    #[must_use]
    pub fn aborts_tick(&self) -> bool {
        !matches!(
            self,
            CoreError::FieldAccess { .. } | CoreError::Coercion { .. }
        )
    }

    /// Processing stage the error belongs to, for log context
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            CoreError::Configuration { .. } => "configure",
            CoreError::Connection { .. } => "connect",
            CoreError::Execution(_) => "execute",
            CoreError::FieldAccess { .. } => "get_field",
            CoreError::Coercion { .. } => "coerce",
            CoreError::Sink { .. } => "sink",
            CoreError::Provider(_) => "provider",
        }
    }
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Initialization(message) => CoreError::Provider(message),
            ProviderError::Locator(message) => CoreError::Connection {
                namespace: String::new(),
                message,
            },
            ProviderError::Connection { namespace, message } => {
                CoreError::Connection { namespace, message }
            }
            ProviderError::FieldAccess { field, message } => {
                CoreError::FieldAccess { field, message }
            }
            err @ (ProviderError::Execution(_)
            | ProviderError::Enumeration(_)
            | ProviderError::InvalidHandle { .. }) => CoreError::Execution(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        let err: CoreError = ProviderError::Connection {
            namespace: "root\\cimv2".to_string(),
            message: "access denied".to_string(),
        }
        .into();
        assert!(matches!(err, CoreError::Connection { .. }));
        assert_eq!(err.stage(), "connect");
        assert!(err.aborts_tick());

        let err: CoreError = ProviderError::Enumeration("row 3".to_string()).into();
        assert!(matches!(err, CoreError::Execution(ref m) if m.contains("row 3")));

        let err: CoreError = ProviderError::FieldAccess {
            field: "Name".to_string(),
            message: "not found".to_string(),
        }
        .into();
        assert!(!err.aborts_tick());
    }
}
