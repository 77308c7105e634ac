//! Configuration types for queries

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Configuration for a single polled query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Interval between two executions of the query
    #[serde(
        default = "default_period",
        serialize_with = "serialize_period",
        deserialize_with = "deserialize_period"
    )]
    pub period: Duration,
    /// Provider class to select from (e.g. `Win32_Process`)
    pub class: String,
    /// Properties to extract from every row
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Raw WQL predicate appended after `WHERE`
    #[serde(default, rename = "whereclause")]
    pub where_clause: String,
    /// Provider namespace; empty selects the provider default
    #[serde(default)]
    pub namespace: String,
}

fn default_period() -> Duration {
    Duration::from_secs(1)
}

impl QueryConfig {
    /// Create a query for `class` with the default period
    pub fn new(class: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            period: default_period(),
            class: class.into(),
            fields,
            where_clause: String::new(),
            namespace: String::new(),
        }
    }

    /// Set the polling period
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Set the raw where-clause
    #[must_use]
    pub fn with_where_clause(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = clause.into();
        self
    }

    /// Set the namespace
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// A property to extract, with its coercion hint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FieldSpecRepr")]
pub struct FieldSpec {
    /// Property name
    pub name: String,
    /// Parse the property's textual value as a base-10 integer
    #[serde(rename = "int")]
    pub is_integer: bool,
}

impl FieldSpec {
    /// Field passed through with its native type
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_integer: false,
        }
    }

    /// Field coerced to an integer
    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_integer: true,
        }
    }
}

impl From<&str> for FieldSpec {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Accepted encodings: a bare name, or `{ name, int }`
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldSpecRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        int: bool,
    },
}

impl From<FieldSpecRepr> for FieldSpec {
    fn from(repr: FieldSpecRepr) -> Self {
        match repr {
            FieldSpecRepr::Name(name) => Self::new(name),
            FieldSpecRepr::Full { name, int } => Self {
                name,
                is_integer: int,
            },
        }
    }
}

/// Error returned by [`parse_duration`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationParseError(String);

impl fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid duration {:?}: expected e.g. 500ms, 10s, 5m, 1h", self.0)
    }
}

impl std::error::Error for DurationParseError {}

/// Parse a duration such as `250ms`, `10s`, `5m` or `1h`
///
/// A bare number is taken as seconds.
///
/// # Errors
/// Returns an error if the number or unit is not recognized.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: u64 = number
        .parse()
        .map_err(|_| DurationParseError(input.to_string()))?;

    let secs = match unit.trim() {
        "ms" => return Ok(Duration::from_millis(value)),
        "" | "s" => Some(value),
        "m" => value.checked_mul(60),
        "h" => value.checked_mul(3600),
        _ => None,
    };
    secs.map(Duration::from_secs)
        .ok_or_else(|| DurationParseError(input.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PeriodRepr {
    Seconds(u64),
    Text(String),
}

fn deserialize_period<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match PeriodRepr::deserialize(deserializer)? {
        PeriodRepr::Seconds(secs) => Ok(Duration::from_secs(secs)),
        PeriodRepr::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn serialize_period<S>(period: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if period.subsec_millis() == 0 {
        serializer.serialize_str(&format!("{}s", period.as_secs()))
    } else {
        serializer.serialize_str(&format!("{}ms", period.as_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Queries {
        queries: Vec<QueryConfig>,
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        assert!(parse_duration("307445734561825861m").is_err());
        assert!(parse_duration("5124095576030432h").is_err());
        assert!(parse_duration("99999999999999999999s").is_err());
        assert_eq!(
            parse_duration("5124095576030431h").unwrap(),
            Duration::from_secs(5_124_095_576_030_431 * 3600)
        );
    }

    #[test]
    fn test_query_config_defaults() {
        let parsed: Queries = toml::from_str(
            r#"
            [[queries]]
            class = "Win32_OperatingSystem"
            fields = ["FreePhysicalMemory"]
            "#,
        )
        .unwrap();

        let query = &parsed.queries[0];
        assert_eq!(query.period, Duration::from_secs(1));
        assert!(query.where_clause.is_empty());
        assert!(query.namespace.is_empty());
    }

    #[test]
    fn test_field_spec_forms() {
        let parsed: Queries = toml::from_str(
            r#"
            [[queries]]
            period = "10s"
            class = "Win32_PerfFormattedData_PerfOS_Memory"
            whereclause = "Name = '_Total'"
            namespace = "root\\cimv2"
            fields = [
                "AvailableMBytes",
                { name = "CommittedBytes", int = true },
                { name = "CacheBytes" },
            ]
            "#,
        )
        .unwrap();

        let query = &parsed.queries[0];
        assert_eq!(query.period, Duration::from_secs(10));
        assert_eq!(query.where_clause, "Name = '_Total'");
        assert_eq!(query.namespace, "root\\cimv2");
        assert_eq!(
            query.fields,
            vec![
                FieldSpec::new("AvailableMBytes"),
                FieldSpec::integer("CommittedBytes"),
                FieldSpec::new("CacheBytes"),
            ]
        );
    }

    #[test]
    fn test_missing_fields_decode_as_empty() {
        let parsed: Queries = toml::from_str(
            r#"
            [[queries]]
            class = "Win32_Service"
            period = 30
            "#,
        )
        .unwrap();

        assert!(parsed.queries[0].fields.is_empty());
        assert_eq!(parsed.queries[0].period, Duration::from_secs(30));
    }

    #[test]
    fn test_period_serializes_as_text() {
        let query = QueryConfig::new("Win32_Process", vec!["Name".into()])
            .with_period(Duration::from_millis(1500));
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["period"], "1500ms");
        assert_eq!(json["fields"][0]["int"], false);
    }
}
