//! Field value coercion

use wmibeat_provider::RawValue;

use crate::config::FieldSpec;
use crate::error::CoreError;

/// Convert a raw provider value according to the field's type hint
///
/// Integer-hinted fields are parsed from the value's textual form, since WMI
/// reports many logically numeric properties (all 64-bit integers among them)
/// as strings. Every other field keeps the provider's native value.
///
/// # Errors
/// Returns [`CoreError::Coercion`] if an integer-hinted value does not parse
/// as a base-10 integer.
pub fn coerce(field: &FieldSpec, raw: RawValue) -> Result<RawValue, CoreError> {
    if !field.is_integer {
        return Ok(raw);
    }

    let coercion_error = || CoreError::Coercion {
        field: field.name.clone(),
        value: raw.to_string(),
    };

    let text = raw.as_text().ok_or_else(coercion_error)?;
    let text = text.trim();

    if let Ok(value) = text.parse::<i64>() {
        return Ok(RawValue::Int(value));
    }
    text.parse::<u64>()
        .map(RawValue::UInt)
        .map_err(|_| coercion_error())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_integer_from_string() {
        let field = FieldSpec::integer("NumberOfProcesses");
        assert_eq!(
            coerce(&field, RawValue::from("42")).unwrap(),
            RawValue::Int(42)
        );
        assert_eq!(
            coerce(&field, RawValue::from(" -17 ")).unwrap(),
            RawValue::Int(-17)
        );
    }

    #[test]
    fn test_integer_rejects_non_numeric() {
        let field = FieldSpec::integer("Caption");
        let err = coerce(&field, RawValue::from("abc")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Coercion { ref field, ref value } if field == "Caption" && value == "abc"
        ));
        assert!(!err.aborts_tick());

        assert!(coerce(&field, RawValue::from("4.5")).is_err());
        assert!(coerce(&field, RawValue::Null).is_err());
        assert!(coerce(&field, RawValue::Bool(true)).is_err());
    }

    #[test]
    fn test_integer_from_native_numbers() {
        let field = FieldSpec::integer("ProcessId");
        assert_eq!(
            coerce(&field, RawValue::UInt(4)).unwrap(),
            RawValue::Int(4)
        );
        assert_eq!(
            coerce(&field, RawValue::from("18446744073709551615")).unwrap(),
            RawValue::UInt(u64::MAX)
        );
    }

    #[test]
    fn test_passthrough_preserves_type() {
        let field = FieldSpec::new("Anything");
        let values = vec![
            RawValue::from("42"),
            RawValue::Int(-1),
            RawValue::Float(0.25),
            RawValue::Bool(false),
            RawValue::Null,
            RawValue::DateTime(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            RawValue::Array(vec![RawValue::from("a")]),
        ];
        for value in values {
            assert_eq!(coerce(&field, value.clone()).unwrap(), value);
        }
    }
}
