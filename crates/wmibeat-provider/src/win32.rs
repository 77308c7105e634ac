//! WMI provider (Windows only)
//!
//! COM objects are bound to the thread that created them, so all live
//! provider state is kept in a thread-local handle table. Callers must make
//! every call for a given handle from the thread that acquired it, after
//! [`ManagementProvider::attach_thread`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, warn};
use wmi::{COMLibrary, Variant, WMIConnection};

use crate::error::ProviderError;
use crate::provider::{Handle, HandleKind, ManagementProvider};
use crate::value::RawValue;

// Instances as returned by the enumerator; properties are converted on access.
type WmiRow = HashMap<String, Variant>;

#[derive(Default)]
struct HandleTable {
    next_id: u64,
    com: Option<COMLibrary>,
    locators: Vec<u64>,
    services: HashMap<u64, WMIConnection>,
    results: HashMap<u64, Vec<WmiRow>>,
    rows: HashMap<u64, (u64, usize)>,
}

impl HandleTable {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

thread_local! {
    static TABLE: RefCell<HandleTable> = RefCell::new(HandleTable::default());
}

/// Management provider bound to the local WMI service
#[derive(Debug, Default)]
pub struct WmiProvider {
    initialized: AtomicBool,
    security_set: AtomicBool,
}

impl WmiProvider {
    /// Create a provider; nothing is initialized until [`ManagementProvider::initialize`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn convert(variant: Variant) -> RawValue {
    match variant {
        Variant::Empty | Variant::Null => RawValue::Null,
        Variant::String(s) => RawValue::String(s),
        Variant::I1(v) => RawValue::Int(i64::from(v)),
        Variant::I2(v) => RawValue::Int(i64::from(v)),
        Variant::I4(v) => RawValue::Int(i64::from(v)),
        Variant::I8(v) => RawValue::Int(v),
        Variant::R4(v) => RawValue::Float(f64::from(v)),
        Variant::R8(v) => RawValue::Float(v),
        Variant::Bool(v) => RawValue::Bool(v),
        Variant::UI1(v) => RawValue::UInt(u64::from(v)),
        Variant::UI2(v) => RawValue::UInt(u64::from(v)),
        Variant::UI4(v) => RawValue::UInt(u64::from(v)),
        Variant::UI8(v) => RawValue::UInt(v),
        Variant::Array(items) => RawValue::Array(items.into_iter().map(convert).collect()),
        _ => RawValue::Null,
    }
}

impl ManagementProvider for WmiProvider {
    fn name(&self) -> &'static str {
        "wmi"
    }

    fn initialize(&self) -> Result<(), ProviderError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("WMI provider already initialized");
        } else {
            info!("WMI provider initialized");
        }
        Ok(())
    }

    fn teardown(&self) {
        if self.initialized.swap(false, Ordering::SeqCst) {
            info!("WMI provider torn down");
        }
    }

    #[instrument(skip(self))]
    fn attach_thread(&self) -> Result<(), ProviderError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(ProviderError::Initialization(
                "provider used before initialize".to_string(),
            ));
        }

        // COM security is process-wide and may be set only once.
        let com = if self.security_set.swap(true, Ordering::SeqCst) {
            COMLibrary::without_security()
        } else {
            COMLibrary::new()
        };
        let com = com.map_err(|e| ProviderError::Initialization(e.to_string()))?;

        TABLE.with(|table| table.borrow_mut().com = Some(com));
        debug!("thread attached to COM");
        Ok(())
    }

    fn detach_thread(&self) {
        TABLE.with(|table| {
            let mut table = table.borrow_mut();
            let leaked = table.services.len() + table.results.len() + table.rows.len();
            if leaked > 0 {
                warn!(leaked, "detaching thread with live WMI handles");
            }
            *table = HandleTable::default();
        });
        debug!("thread detached from COM");
    }

    fn locator(&self) -> Result<Handle, ProviderError> {
        TABLE.with(|table| {
            let mut table = table.borrow_mut();
            if table.com.is_none() {
                return Err(ProviderError::Locator(
                    "thread is not attached to COM".to_string(),
                ));
            }
            let id = table.next();
            table.locators.push(id);
            Ok(Handle::new(HandleKind::Locator, id))
        })
    }

    fn connect(&self, locator: &Handle, namespace: &str) -> Result<Handle, ProviderError> {
        let locator_id = locator.expect_kind(HandleKind::Locator)?;
        TABLE.with(|table| {
            let mut table = table.borrow_mut();
            if !table.locators.contains(&locator_id) {
                return Err(ProviderError::InvalidHandle {
                    kind: HandleKind::Locator,
                    id: locator_id,
                });
            }
            let com = table.com.ok_or_else(|| ProviderError::Connection {
                namespace: namespace.to_string(),
                message: "thread is not attached to COM".to_string(),
            })?;
            let connection = WMIConnection::with_namespace_path(namespace, com).map_err(|e| {
                ProviderError::Connection {
                    namespace: namespace.to_string(),
                    message: e.to_string(),
                }
            })?;
            let id = table.next();
            table.services.insert(id, connection);
            Ok(Handle::new(HandleKind::Service, id))
        })
    }

    fn execute(&self, service: &Handle, query: &str) -> Result<Handle, ProviderError> {
        let service_id = service.expect_kind(HandleKind::Service)?;
        TABLE.with(|table| {
            let mut table = table.borrow_mut();
            let connection =
                table
                    .services
                    .get(&service_id)
                    .ok_or(ProviderError::InvalidHandle {
                        kind: HandleKind::Service,
                        id: service_id,
                    })?;
            // The full set is fetched here since count() must be known up front.
            let rows: Vec<WmiRow> = connection
                .raw_query(query)
                .map_err(|e| ProviderError::Execution(e.to_string()))?;
            let id = table.next();
            table.results.insert(id, rows);
            Ok(Handle::new(HandleKind::ResultSet, id))
        })
    }

    fn count(&self, result_set: &Handle) -> Result<usize, ProviderError> {
        let id = result_set.expect_kind(HandleKind::ResultSet)?;
        TABLE.with(|table| {
            table
                .borrow()
                .results
                .get(&id)
                .map(Vec::len)
                .ok_or(ProviderError::InvalidHandle {
                    kind: HandleKind::ResultSet,
                    id,
                })
        })
    }

    fn row_at(&self, result_set: &Handle, index: usize) -> Result<Handle, ProviderError> {
        let result_id = result_set.expect_kind(HandleKind::ResultSet)?;
        TABLE.with(|table| {
            let mut table = table.borrow_mut();
            let len = table
                .results
                .get(&result_id)
                .map(Vec::len)
                .ok_or(ProviderError::InvalidHandle {
                    kind: HandleKind::ResultSet,
                    id: result_id,
                })?;
            if index >= len {
                return Err(ProviderError::Enumeration(format!(
                    "row index {index} out of range ({len} rows)"
                )));
            }
            let id = table.next();
            table.rows.insert(id, (result_id, index));
            Ok(Handle::new(HandleKind::Row, id))
        })
    }

    fn get_field(&self, row: &Handle, field: &str) -> Result<RawValue, ProviderError> {
        let row_id = row.expect_kind(HandleKind::Row)?;
        TABLE.with(|table| {
            let table = table.borrow();
            let (result_id, index) =
                *table.rows.get(&row_id).ok_or(ProviderError::InvalidHandle {
                    kind: HandleKind::Row,
                    id: row_id,
                })?;
            table
                .results
                .get(&result_id)
                .and_then(|rows| rows.get(index))
                .and_then(|values| values.get(field))
                .cloned()
                .map(convert)
                .ok_or_else(|| ProviderError::FieldAccess {
                    field: field.to_string(),
                    message: "property not present on instance".to_string(),
                })
        })
    }

    fn release(&self, handle: Handle) {
        TABLE.with(|table| {
            let mut table = table.borrow_mut();
            let id = handle.id();
            let released = match handle.kind() {
                HandleKind::Locator => {
                    let before = table.locators.len();
                    table.locators.retain(|l| *l != id);
                    table.locators.len() != before
                }
                HandleKind::Service => table.services.remove(&id).is_some(),
                HandleKind::ResultSet => table.results.remove(&id).is_some(),
                HandleKind::Row => table.rows.remove(&id).is_some(),
            };
            if !released {
                warn!(kind = %handle.kind(), id, "release of unknown WMI handle");
            }
        });
    }
}
