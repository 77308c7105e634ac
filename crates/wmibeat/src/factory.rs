//! Management provider selection

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use eyre::Result;
use serde_json::Value;
use wmibeat_provider::{FakeProvider, ManagementProvider, RawValue};

/// Provider backing the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    /// Local WMI service (Windows only)
    #[default]
    Wmi,
    /// In-memory rows loaded from a JSON fixture file
    Fake,
}

/// Create the provider selected on the command line
///
/// # Errors
/// Returns error if the provider is unavailable on this platform or the
/// fixture file cannot be loaded
pub fn create_provider(
    kind: ProviderKind,
    fixtures: Option<&Path>,
) -> Result<Arc<dyn ManagementProvider>> {
    match kind {
        ProviderKind::Wmi => wmi_provider(),
        ProviderKind::Fake => {
            let provider = FakeProvider::new();
            if let Some(path) = fixtures {
                load_fixtures(&provider, path)?;
            } else {
                tracing::warn!("fake provider without fixtures, every query will fail");
            }
            Ok(Arc::new(provider))
        }
    }
}

#[cfg(windows)]
fn wmi_provider() -> Result<Arc<dyn ManagementProvider>> {
    Ok(Arc::new(wmibeat_provider::WmiProvider::new()))
}

#[cfg(not(windows))]
fn wmi_provider() -> Result<Arc<dyn ManagementProvider>> {
    eyre::bail!("the WMI provider is only available on Windows (use --provider fake)")
}

/// Load `{ "<class>": [ { "<property>": <value>, ... }, ... ] }` into `provider`
fn load_fixtures(provider: &FakeProvider, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("failed to read fixtures {}: {e}", path.display()))?;
    let classes: HashMap<String, Vec<BTreeMap<String, Value>>> = serde_json::from_str(&content)
        .map_err(|e| eyre::eyre!("invalid fixtures {}: {e}", path.display()))?;

    for (class, rows) in classes {
        tracing::info!(%class, rows = rows.len(), "loaded fixture rows");
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|(k, v)| (k, json_to_raw(v))).collect())
            .collect();
        provider.set_rows(class, rows);
    }
    Ok(())
}

fn json_to_raw(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                RawValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                RawValue::UInt(u)
            } else {
                RawValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => RawValue::String(s),
        Value::Array(items) => RawValue::Array(items.into_iter().map(json_to_raw).collect()),
        // Embedded objects have no scalar form; keep their JSON text.
        Value::Object(_) => RawValue::String(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wmibeat_provider::ManagementSession;

    use super::*;

    #[test]
    fn test_json_to_raw() {
        assert_eq!(json_to_raw(json!(null)), RawValue::Null);
        assert_eq!(json_to_raw(json!(-3)), RawValue::Int(-3));
        assert_eq!(json_to_raw(json!(u64::MAX)), RawValue::UInt(u64::MAX));
        assert_eq!(json_to_raw(json!(1.5)), RawValue::Float(1.5));
        assert_eq!(json_to_raw(json!("x")), RawValue::from("x"));
        assert_eq!(
            json_to_raw(json!([true, "a"])),
            RawValue::Array(vec![RawValue::Bool(true), RawValue::from("a")])
        );
    }

    #[test]
    fn test_fake_provider_with_fixtures() {
        let path = std::env::temp_dir().join(format!("wmibeat-fixtures-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "Win32_Process": [ { "Name": "System", "ProcessId": 4 } ] }"#,
        )
        .unwrap();

        let provider = create_provider(ProviderKind::Fake, Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        let session = ManagementSession::open(provider.as_ref(), "").unwrap();
        let result = session.execute("SELECT Name FROM Win32_Process").unwrap();
        assert_eq!(result.count().unwrap(), 1);
        let row = result.row(0).unwrap();
        assert_eq!(row.get("ProcessId").unwrap(), RawValue::Int(4));
    }

    #[test]
    fn test_missing_fixture_file() {
        let result = create_provider(ProviderKind::Fake, Some(Path::new("/nonexistent.json")));
        assert!(result.is_err());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_wmi_unavailable_off_windows() {
        assert!(create_provider(ProviderKind::Wmi, None).is_err());
    }
}
