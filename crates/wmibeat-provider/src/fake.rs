//! In-memory management provider
//!
//! Serves rows registered per class, tracks every handle it mints and records
//! releases, and can inject failures at each stage. Used by the engine tests
//! and for running the daemon without a real provider.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::provider::{Handle, HandleKind, ManagementProvider};
use crate::value::RawValue;

/// A single fake row: property name to value
pub type FakeRow = BTreeMap<String, RawValue>;

/// Provider-side state behind a live handle
#[derive(Debug)]
enum Resource {
    Locator,
    Service(String),
    ResultSet(Vec<FakeRow>),
    Row(FakeRow),
}

#[derive(Debug, Default)]
struct FakeState {
    classes: HashMap<String, Vec<FakeRow>>,
    next_id: u64,
    live: HashMap<u64, (HandleKind, Resource)>,
    acquire_log: Vec<(HandleKind, u64)>,
    release_log: Vec<(HandleKind, u64)>,
    executed: Vec<(String, String)>,
    connect_failures: u32,
    execute_failures: u32,
    count_failures: u32,
    execute_panics: u32,
    failing_rows: HashSet<usize>,
    execute_delay: Option<Duration>,
    stray_releases: u32,
    initialized: u32,
    teardowns: u32,
    attached: u32,
    detached: u32,
}

impl FakeState {
    fn mint(&mut self, kind: HandleKind, resource: Resource) -> Handle {
        self.next_id += 1;
        let id = self.next_id;
        self.live.insert(id, (kind, resource));
        self.acquire_log.push((kind, id));
        Handle::new(kind, id)
    }

    fn resource(&self, handle: &Handle, kind: HandleKind) -> Result<&Resource, ProviderError> {
        let id = handle.expect_kind(kind)?;
        match self.live.get(&id) {
            Some((live_kind, resource)) if *live_kind == kind => Ok(resource),
            _ => Err(ProviderError::InvalidHandle { kind, id }),
        }
    }
}

/// Management provider backed by in-memory rows
#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    /// Create an empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the rows returned for `class`
    pub fn set_rows(&self, class: impl Into<String>, rows: Vec<FakeRow>) {
        self.state().classes.insert(class.into(), rows);
    }

    /// Fail the next `n` connect calls
    pub fn fail_next_connects(&self, n: u32) {
        self.state().connect_failures = n;
    }

    /// Fail the next `n` execute calls
    pub fn fail_next_executes(&self, n: u32) {
        self.state().execute_failures = n;
    }

    /// Fail the next `n` count calls
    pub fn fail_next_counts(&self, n: u32) {
        self.state().count_failures = n;
    }

    /// Panic inside the next `n` execute calls
    pub fn panic_next_executes(&self, n: u32) {
        self.state().execute_panics = n;
    }

    /// Fail every fetch of the row at `index`
    pub fn fail_row(&self, index: usize) {
        self.state().failing_rows.insert(index);
    }

    /// Block every execute call for `delay`, simulating a slow provider
    pub fn set_execute_delay(&self, delay: Duration) {
        self.state().execute_delay = Some(delay);
    }

    /// Number of handles acquired and not yet released
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.state().live.len()
    }

    /// Every acquisition so far, in order
    #[must_use]
    pub fn acquire_log(&self) -> Vec<(HandleKind, u64)> {
        self.state().acquire_log.clone()
    }

    /// Every release so far, in order
    #[must_use]
    pub fn release_log(&self) -> Vec<(HandleKind, u64)> {
        self.state().release_log.clone()
    }

    /// Releases of handles the provider did not know about
    #[must_use]
    pub fn stray_releases(&self) -> u32 {
        self.state().stray_releases
    }

    /// `(namespace, query)` pairs of every execute call
    #[must_use]
    pub fn executed_queries(&self) -> Vec<(String, String)> {
        self.state().executed.clone()
    }

    /// `(initialize, teardown)` call counts
    #[must_use]
    pub fn lifecycle_counts(&self) -> (u32, u32) {
        let state = self.state();
        (state.initialized, state.teardowns)
    }

    /// `(attach, detach)` call counts
    #[must_use]
    pub fn thread_counts(&self) -> (u32, u32) {
        let state = self.state();
        (state.attached, state.detached)
    }
}

impl ManagementProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn initialize(&self) -> Result<(), ProviderError> {
        self.state().initialized += 1;
        Ok(())
    }

    fn teardown(&self) {
        self.state().teardowns += 1;
    }

    fn attach_thread(&self) -> Result<(), ProviderError> {
        self.state().attached += 1;
        Ok(())
    }

    fn detach_thread(&self) {
        self.state().detached += 1;
    }

    fn locator(&self) -> Result<Handle, ProviderError> {
        Ok(self.state().mint(HandleKind::Locator, Resource::Locator))
    }

    fn connect(&self, locator: &Handle, namespace: &str) -> Result<Handle, ProviderError> {
        let mut state = self.state();
        state.resource(locator, HandleKind::Locator)?;

        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ProviderError::Connection {
                namespace: namespace.to_string(),
                message: "access denied".to_string(),
            });
        }

        Ok(state.mint(HandleKind::Service, Resource::Service(namespace.to_string())))
    }

    fn execute(&self, service: &Handle, query: &str) -> Result<Handle, ProviderError> {
        let delay = self.state().execute_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let panics = {
            let mut state = self.state();
            let panics = state.execute_panics > 0;
            state.execute_panics = state.execute_panics.saturating_sub(1);
            panics
        };
        if panics {
            panic!("fake provider crashed executing {query}");
        }

        let mut state = self.state();
        let namespace = match state.resource(service, HandleKind::Service)? {
            Resource::Service(namespace) => namespace.clone(),
            _ => {
                return Err(ProviderError::InvalidHandle {
                    kind: HandleKind::Service,
                    id: service.id(),
                });
            }
        };
        state.executed.push((namespace, query.to_string()));

        if state.execute_failures > 0 {
            state.execute_failures -= 1;
            return Err(ProviderError::Execution("invalid query".to_string()));
        }

        let class = extract_class_name(query)
            .ok_or_else(|| ProviderError::Execution(format!("no FROM clause in {query}")))?;
        let rows = state
            .classes
            .get(&class)
            .cloned()
            .ok_or_else(|| ProviderError::Execution(format!("invalid class {class}")))?;

        debug!(%class, rows = rows.len(), "fake query executed");

        Ok(state.mint(HandleKind::ResultSet, Resource::ResultSet(rows)))
    }

    fn count(&self, result_set: &Handle) -> Result<usize, ProviderError> {
        let mut state = self.state();
        if state.count_failures > 0 {
            state.count_failures -= 1;
            return Err(ProviderError::Enumeration("count unavailable".to_string()));
        }
        match state.resource(result_set, HandleKind::ResultSet)? {
            Resource::ResultSet(rows) => Ok(rows.len()),
            _ => Err(ProviderError::InvalidHandle {
                kind: HandleKind::ResultSet,
                id: result_set.id(),
            }),
        }
    }

    fn row_at(&self, result_set: &Handle, index: usize) -> Result<Handle, ProviderError> {
        let mut state = self.state();
        if state.failing_rows.contains(&index) {
            return Err(ProviderError::Enumeration(format!(
                "unable to fetch row {index}"
            )));
        }
        let row = match state.resource(result_set, HandleKind::ResultSet)? {
            Resource::ResultSet(rows) => rows.get(index).cloned().ok_or_else(|| {
                ProviderError::Enumeration(format!("row index {index} out of range"))
            })?,
            _ => {
                return Err(ProviderError::InvalidHandle {
                    kind: HandleKind::ResultSet,
                    id: result_set.id(),
                });
            }
        };
        Ok(state.mint(HandleKind::Row, Resource::Row(row)))
    }

    fn get_field(&self, row: &Handle, field: &str) -> Result<RawValue, ProviderError> {
        let state = self.state();
        match state.resource(row, HandleKind::Row)? {
            Resource::Row(values) => {
                values
                    .get(field)
                    .cloned()
                    .ok_or_else(|| ProviderError::FieldAccess {
                        field: field.to_string(),
                        message: "property not found".to_string(),
                    })
            }
            _ => Err(ProviderError::InvalidHandle {
                kind: HandleKind::Row,
                id: row.id(),
            }),
        }
    }

    fn release(&self, handle: Handle) {
        let mut state = self.state();
        match state.live.remove(&handle.id()) {
            Some((kind, _)) if kind == handle.kind() => {
                state.release_log.push((kind, handle.id()));
            }
            _ => {
                warn!(kind = %handle.kind(), id = handle.id(), "release of unknown handle");
                state.stray_releases += 1;
            }
        }
    }
}

/// Extract the class name from a WQL query (simple heuristic)
fn extract_class_name(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    let pos = lower.find(" from ")?;
    let after_from = query[pos + 6..].trim_start();
    let end = after_from
        .find(|c: char| c.is_whitespace() || c == ';')
        .unwrap_or(after_from.len());
    let class = after_from[..end].trim();
    (!class.is_empty()).then(|| class.to_string())
}
