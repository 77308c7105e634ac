//! wmibeat-provider: management provider access
//!
//! Defines the capability interface to the local management provider, the
//! scoped [`ManagementSession`] that releases every provider handle it
//! acquires, and the provider implementations (WMI on Windows, an in-memory
//! fake everywhere).

pub mod error;
pub mod fake;
pub mod provider;
pub mod session;
pub mod value;
#[cfg(windows)]
pub mod win32;

pub use error::ProviderError;
pub use fake::FakeProvider;
pub use provider::{DEFAULT_NAMESPACE, Handle, HandleKind, ManagementProvider};
pub use session::{ManagementSession, ResultSet, Row, Rows};
pub use value::RawValue;
#[cfg(windows)]
pub use win32::WmiProvider;
