//! Scoped provider sessions
//!
//! A [`ManagementSession`] holds the locator and service handles for one query
//! execution. [`ResultSet`] and [`Row`] borrow from the session, so the borrow
//! checker forces them to be released before the handles they were derived
//! from. Every handle is released by a drop guard, on success and on every
//! error path.

use tracing::{debug, instrument, trace};

use crate::error::ProviderError;
use crate::provider::{DEFAULT_NAMESPACE, Handle, ManagementProvider};
use crate::value::RawValue;

/// Releases its handle exactly once, when dropped
struct HandleGuard<'p> {
    provider: &'p dyn ManagementProvider,
    handle: Option<Handle>,
}

impl<'p> HandleGuard<'p> {
    fn new(provider: &'p dyn ManagementProvider, handle: Handle) -> Self {
        Self {
            provider,
            handle: Some(handle),
        }
    }

    fn handle(&self) -> &Handle {
        // Only taken in `drop`.
        self.handle
            .as_ref()
            .unwrap_or_else(|| unreachable!("handle released before guard was dropped"))
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            trace!(kind = %handle.kind(), id = handle.id(), "releasing handle");
            self.provider.release(handle);
        }
    }
}

/// Connection to one provider namespace, valid for a single tick
pub struct ManagementSession<'p> {
    provider: &'p dyn ManagementProvider,
    namespace: String,
    // Fields drop in declaration order: service before locator.
    service: HandleGuard<'p>,
    #[allow(dead_code)]
    locator: HandleGuard<'p>,
}

impl<'p> ManagementSession<'p> {
    /// Create a locator and connect to `namespace`
    ///
    /// An empty namespace selects [`DEFAULT_NAMESPACE`].
    ///
    /// # Errors
    /// Returns an error if the locator cannot be created or the connection
    /// fails. Anything acquired before the failure is released.
    #[instrument(skip(provider), fields(provider = provider.name()))]
    pub fn open(
        provider: &'p dyn ManagementProvider,
        namespace: &str,
    ) -> Result<Self, ProviderError> {
        let namespace = if namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            namespace
        };

        let locator = HandleGuard::new(provider, provider.locator()?);
        let service = HandleGuard::new(provider, provider.connect(locator.handle(), namespace)?);

        debug!(namespace, "connected to provider");

        Ok(Self {
            provider,
            namespace: namespace.to_string(),
            service,
            locator,
        })
    }

    /// Namespace this session is connected to
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Execute a query
    ///
    /// # Errors
    /// Returns an error if the provider rejects or fails the query.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub fn execute(&self, query: &str) -> Result<ResultSet<'_>, ProviderError> {
        let handle = self.provider.execute(self.service.handle(), query)?;
        Ok(ResultSet {
            provider: self.provider,
            guard: HandleGuard::new(self.provider, handle),
        })
    }
}

/// Result collection of one executed query
pub struct ResultSet<'s> {
    provider: &'s dyn ManagementProvider,
    guard: HandleGuard<'s>,
}

impl ResultSet<'_> {
    /// Number of rows
    ///
    /// # Errors
    /// Returns an error if the provider cannot report the count.
    pub fn count(&self) -> Result<usize, ProviderError> {
        self.provider.count(self.guard.handle())
    }

    /// Fetch the row at `index`
    ///
    /// # Errors
    /// Returns an error if the row cannot be fetched.
    pub fn row(&self, index: usize) -> Result<Row<'_>, ProviderError> {
        let handle = self.provider.row_at(self.guard.handle(), index)?;
        Ok(Row {
            provider: self.provider,
            guard: HandleGuard::new(self.provider, handle),
        })
    }

    /// Lazily enumerate rows in provider order
    ///
    /// The count is read once; each row is fetched when the iterator advances.
    ///
    /// # Errors
    /// Returns an error if the count cannot be read.
    pub fn rows(&self) -> Result<Rows<'_>, ProviderError> {
        let count = self.count()?;
        Ok(Rows {
            provider: self.provider,
            result_set: self.guard.handle(),
            next: 0,
            count,
        })
    }
}

/// Lazy row iterator over a [`ResultSet`]
pub struct Rows<'r> {
    provider: &'r dyn ManagementProvider,
    result_set: &'r Handle,
    next: usize,
    count: usize,
}

impl<'r> Iterator for Rows<'r> {
    type Item = Result<Row<'r>, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let index = self.next;
        self.next += 1;

        Some(
            self.provider
                .row_at(self.result_set, index)
                .map(|handle| Row {
                    provider: self.provider,
                    guard: HandleGuard::new(self.provider, handle),
                }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

/// One entity instance of a result set
pub struct Row<'r> {
    provider: &'r dyn ManagementProvider,
    guard: HandleGuard<'r>,
}

impl Row<'_> {
    /// Read a named property
    ///
    /// # Errors
    /// Returns [`ProviderError::FieldAccess`] if the property cannot be read.
    pub fn get(&self, field: &str) -> Result<RawValue, ProviderError> {
        self.provider.get_field(self.guard.handle(), field)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::fake::FakeProvider;
    use crate::provider::HandleKind;

    fn provider_with_rows(rows: usize) -> FakeProvider {
        let provider = FakeProvider::new();
        let rows = (0..rows)
            .map(|i| {
                let mut row = BTreeMap::new();
                row.insert("Name".to_string(), RawValue::from(format!("proc{i}")));
                row
            })
            .collect();
        provider.set_rows("Win32_Process", rows);
        provider
    }

    fn collect_names(provider: &FakeProvider) -> Result<Vec<String>, ProviderError> {
        let session = ManagementSession::open(provider, "")?;
        let result = session.execute("SELECT Name FROM Win32_Process")?;
        let mut names = Vec::new();
        for row in result.rows()? {
            names.push(row?.get("Name")?.to_string());
        }
        Ok(names)
    }

    fn released_kinds(provider: &FakeProvider) -> Vec<HandleKind> {
        provider.release_log().into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_success_releases_in_reverse_order() {
        let provider = provider_with_rows(2);
        {
            let session = ManagementSession::open(&provider, "").unwrap();
            assert_eq!(session.namespace(), DEFAULT_NAMESPACE);
            let result = session.execute("SELECT Name FROM Win32_Process").unwrap();
            for row in result.rows().unwrap() {
                let row = row.unwrap();
                assert!(row.get("Name").is_ok());
            }
        }

        assert_eq!(provider.live_handles(), 0);
        assert_eq!(
            released_kinds(&provider),
            vec![
                HandleKind::Row,
                HandleKind::Row,
                HandleKind::ResultSet,
                HandleKind::Service,
                HandleKind::Locator,
            ]
        );
    }

    #[test]
    fn test_connect_failure_releases_locator() {
        let provider = provider_with_rows(1);
        provider.fail_next_connects(1);

        let result = ManagementSession::open(&provider, "root\\cimv2");
        assert!(matches!(result, Err(ProviderError::Connection { .. })));
        assert_eq!(provider.live_handles(), 0);
        assert_eq!(released_kinds(&provider), vec![HandleKind::Locator]);
    }

    #[test]
    fn test_execute_failure_releases_service_then_locator() {
        let provider = provider_with_rows(1);
        provider.fail_next_executes(1);

        {
            let session = ManagementSession::open(&provider, "").unwrap();
            assert!(session.execute("SELECT Name FROM Win32_Process").is_err());
        }

        assert_eq!(provider.live_handles(), 0);
        assert_eq!(
            released_kinds(&provider),
            vec![HandleKind::Service, HandleKind::Locator]
        );
    }

    #[test]
    fn test_count_failure_releases_in_reverse_acquisition_order() {
        let provider = provider_with_rows(2);
        provider.fail_next_counts(1);

        let outcome = collect_names(&provider);

        assert!(matches!(outcome, Err(ProviderError::Enumeration(_))));
        assert_eq!(provider.live_handles(), 0);
        assert_eq!(
            released_kinds(&provider),
            vec![HandleKind::ResultSet, HandleKind::Service, HandleKind::Locator]
        );

        let mut acquired = provider.acquire_log();
        acquired.reverse();
        assert_eq!(provider.release_log(), acquired);
    }

    #[test]
    fn test_row_failure_mid_enumeration_releases_everything() {
        let provider = provider_with_rows(3);
        provider.fail_row(1);

        let outcome = collect_names(&provider);

        assert!(matches!(outcome, Err(ProviderError::Enumeration(_))));
        assert_eq!(provider.live_handles(), 0);
        assert_eq!(
            released_kinds(&provider),
            vec![
                HandleKind::Row,
                HandleKind::ResultSet,
                HandleKind::Service,
                HandleKind::Locator,
            ]
        );
    }

    #[test]
    fn test_missing_field_is_field_access_error() {
        let provider = provider_with_rows(1);
        let session = ManagementSession::open(&provider, "").unwrap();
        let result = session.execute("SELECT * FROM Win32_Process").unwrap();
        let row = result.row(0).unwrap();

        let err = row.get("Missing").unwrap_err();
        assert!(matches!(err, ProviderError::FieldAccess { ref field, .. } if field == "Missing"));
        assert!(!err.aborts_tick());
    }

    #[test]
    fn test_rows_size_hint() {
        let provider = provider_with_rows(4);
        let session = ManagementSession::open(&provider, "").unwrap();
        let result = session.execute("SELECT * FROM Win32_Process").unwrap();
        let mut rows = result.rows().unwrap();
        assert_eq!(rows.size_hint(), (4, Some(4)));
        drop(rows.next());
        assert_eq!(rows.size_hint(), (3, Some(3)));
    }
}
