//! Management provider capability interface

use std::fmt;

use crate::error::ProviderError;
use crate::value::RawValue;

/// Namespace used when a query does not configure one
pub const DEFAULT_NAMESPACE: &str = "root\\cimv2";

/// Kind of provider-side resource a [`Handle`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Locator,
    Service,
    ResultSet,
    Row,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Locator => "locator",
            HandleKind::Service => "service",
            HandleKind::ResultSet => "result set",
            HandleKind::Row => "row",
        };
        f.write_str(name)
    }
}

/// Opaque reference to a provider-side resource
///
/// Handles are deliberately not `Clone`: [`ManagementProvider::release`]
/// takes the handle by value, so each one can be released at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct Handle {
    kind: HandleKind,
    id: u64,
}

impl Handle {
    /// Create a handle; only provider implementations should mint handles
    #[must_use]
    pub fn new(kind: HandleKind, id: u64) -> Self {
        Self { kind, id }
    }

    /// Resource kind
    #[must_use]
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Provider-assigned id
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fail with [`ProviderError::InvalidHandle`] unless this is a `kind` handle
    ///
    /// # Errors
    /// Returns an error if the handle kind does not match.
    pub fn expect_kind(&self, kind: HandleKind) -> Result<u64, ProviderError> {
        if self.kind == kind {
            Ok(self.id)
        } else {
            Err(ProviderError::InvalidHandle { kind, id: self.id })
        }
    }
}

/// Synchronous access to a local management provider
///
/// Every call may block. Callers normally go through
/// [`ManagementSession`](crate::session::ManagementSession), which pairs each
/// acquiring call with exactly one [`release`](Self::release).
pub trait ManagementProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Process-wide interop initialization, called once before any worker starts
    ///
    /// # Errors
    /// Returns an error if the interop layer cannot be initialized.
    fn initialize(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Process-wide teardown, called once after every worker has exited
    fn teardown(&self) {}

    /// Bind the calling thread to the interop layer
    ///
    /// # Errors
    /// Returns an error if the thread cannot use the provider.
    fn attach_thread(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Unbind the calling thread
    fn detach_thread(&self) {}

    /// Create a locator
    ///
    /// # Errors
    /// Returns an error if the locator object cannot be created.
    fn locator(&self) -> Result<Handle, ProviderError>;

    /// Connect to `namespace` through `locator`
    ///
    /// # Errors
    /// Returns an error if the service connection fails.
    fn connect(&self, locator: &Handle, namespace: &str) -> Result<Handle, ProviderError>;

    /// Execute a query on a service connection
    ///
    /// # Errors
    /// Returns an error if the query is rejected or execution fails.
    fn execute(&self, service: &Handle, query: &str) -> Result<Handle, ProviderError>;

    /// Number of rows in a result set
    ///
    /// # Errors
    /// Returns an error if the count cannot be read.
    fn count(&self, result_set: &Handle) -> Result<usize, ProviderError>;

    /// Row at `index` of a result set
    ///
    /// # Errors
    /// Returns an error if the row cannot be fetched.
    fn row_at(&self, result_set: &Handle, index: usize) -> Result<Handle, ProviderError>;

    /// Read a named property from a row
    ///
    /// # Errors
    /// Returns [`ProviderError::FieldAccess`] if the property cannot be read.
    fn get_field(&self, row: &Handle, field: &str) -> Result<RawValue, ProviderError>;

    /// Release a handle
    fn release(&self, handle: Handle);
}
