//! WQL query builder

use std::fmt;

use tracing::info;

use crate::config::QueryConfig;
use crate::error::CoreError;

/// A query string, built once per configured query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery(String);

impl BuiltQuery {
    /// Query text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuiltQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// WQL query builder
///
/// Class names and the where-clause are passed through uninterpreted; the
/// provider is the judge of their syntax.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    /// SELECT clause
    select: Vec<String>,
    /// FROM clause
    from: String,
    /// Raw WHERE predicate
    where_clause: Option<String>,
}

impl QueryBuilder {
    /// Create a query selecting all properties of a class
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            select: vec!["*".to_string()],
            from: class.into(),
            where_clause: None,
        }
    }

    /// Select specific properties
    #[must_use]
    pub fn select<S: AsRef<str>>(mut self, properties: &[S]) -> Self {
        self.select = properties.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    /// Append a raw WHERE predicate; an empty predicate is ignored
    #[must_use]
    pub fn where_clause(mut self, clause: &str) -> Self {
        self.where_clause = (!clause.is_empty()).then(|| clause.to_string());
        self
    }

    /// Build the query string
    #[must_use]
    pub fn build(&self) -> BuiltQuery {
        let mut wql = format!("SELECT {} FROM {}", self.select.join(", "), self.from);

        if let Some(ref clause) = self.where_clause {
            wql.push_str(" WHERE ");
            wql.push_str(clause);
        }

        BuiltQuery(wql)
    }

    /// Build the query for a configured class
    ///
    /// # Errors
    /// Returns [`CoreError::Configuration`] if no fields are configured.
    pub fn from_config(config: &QueryConfig) -> Result<BuiltQuery, CoreError> {
        if config.fields.is_empty() {
            return Err(CoreError::Configuration {
                class: config.class.clone(),
                message: "no fields defined".to_string(),
            });
        }

        let names: Vec<&str> = config.fields.iter().map(|f| f.name.as_str()).collect();
        let query = Self::new(config.class.as_str())
            .select(&names)
            .where_clause(&config.where_clause)
            .build();

        info!(class = %config.class, query = %query, "created query");

        Ok(query)
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldSpec;

    #[test]
    fn test_query_builder() {
        let query = QueryBuilder::new("Win32_LogicalDisk")
            .select(&["Name", "FreeSpace"])
            .where_clause("DriveType = 3")
            .build();

        assert_eq!(
            query.as_str(),
            "SELECT Name, FreeSpace FROM Win32_LogicalDisk WHERE DriveType = 3"
        );
    }

    #[test]
    fn test_select_all_by_default() {
        let query = QueryBuilder::new("Win32_Process").build();
        assert_eq!(query.to_string(), "SELECT * FROM Win32_Process");
    }

    #[test]
    fn test_from_config() {
        let config = QueryConfig::new(
            "Win32_Service",
            vec![FieldSpec::new("Name"), FieldSpec::integer("ProcessId")],
        )
        .with_where_clause("State = 'Running' AND StartMode <> 'Disabled'");

        let query = QueryBuilder::from_config(&config).unwrap();
        assert!(query.as_str().starts_with("SELECT Name, ProcessId FROM Win32_Service"));
        assert!(
            query
                .as_str()
                .ends_with(" WHERE State = 'Running' AND StartMode <> 'Disabled'")
        );
    }

    #[test]
    fn test_empty_where_clause_omitted() {
        let config = QueryConfig::new("Win32_Process", vec!["Name".into()]);
        let query = QueryBuilder::from_config(&config).unwrap();
        assert!(!query.as_str().contains("WHERE"));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let config = QueryConfig::new("Win32_Process", vec![]).with_where_clause("Name = 'x'");
        let err = QueryBuilder::from_config(&config).unwrap_err();
        assert!(matches!(err, CoreError::Configuration { ref class, .. } if class == "Win32_Process"));
    }

    #[test]
    fn test_deterministic_and_uninterpreted() {
        // Odd class names and predicates are the provider's problem.
        let config = QueryConfig::new("Not A Class!", vec!["x".into()])
            .with_where_clause("((unbalanced")
            .with_namespace("root\\nowhere");

        let first = QueryBuilder::from_config(&config).unwrap();
        let second = QueryBuilder::from_config(&config).unwrap();
        assert_eq!(first, second);
        assert!(first.as_str().contains("Not A Class!"));
        assert!(first.as_str().contains("((unbalanced"));
    }
}
