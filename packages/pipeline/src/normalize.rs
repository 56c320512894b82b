//! Address normalization for bsls.
//!
//! Bsl addresses carry building designators (`123 MAIN ST BLDG A`) that
//! address points do not, so the first ` BLDG <word>` is stripped before
//! comparison.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

/// First building designator, case-sensitive.
static BLDG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" BLDG \w+").expect("valid regex"));

/// Comparison-ready address text derived from raw bsl fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAddress {
    /// Primary line without the building designator.
    pub primary_norm: String,
    /// `"{primary}, {city}, {state} {zip}"`.
    pub full: String,
    /// `"{primary_norm}, {city}, {state} {zip}"`.
    pub full_norm: String,
}

/// Normalizes a bsl address.
#[must_use]
pub fn normalize(primary: &str, city: &str, state: &str, zip: &str) -> NormalizedAddress {
    let primary_norm = normalize_primary(primary);
    NormalizedAddress {
        full: format_full(primary, city, state, zip),
        full_norm: format_full(&primary_norm, city, state, zip),
        primary_norm,
    }
}

/// Removes the first ` BLDG <word chars>` from a primary address line.
#[must_use]
pub fn normalize_primary(primary: &str) -> String {
    BLDG_RE.replace(primary, "").into_owned()
}

fn format_full(primary: &str, city: &str, state: &str, zip: &str) -> String {
    format!("{primary}, {city}, {state} {zip}")
}

/// Derived columns for a bsl whose raw fields may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedColumns {
    pub address_primary_norm: Option<String>,
    pub address_full: Option<String>,
    pub address_full_norm: Option<String>,
}

/// Normalizes raw fields where any may be missing. A missing field makes
/// every value built from it missing too.
#[must_use]
pub fn normalize_fields(
    primary: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    zip: Option<&str>,
) -> NormalizedColumns {
    let Some(primary) = primary else {
        return NormalizedColumns::default();
    };

    match (city, state, zip) {
        (Some(city), Some(state), Some(zip)) => {
            let normalized = normalize(primary, city, state, zip);
            NormalizedColumns {
                address_primary_norm: Some(normalized.primary_norm),
                address_full: Some(normalized.full),
                address_full_norm: Some(normalized.full_norm),
            }
        }
        _ => NormalizedColumns {
            address_primary_norm: Some(normalize_primary(primary)),
            address_full: None,
            address_full_norm: None,
        },
    }
}

/// Reads an attribute as text. Numbers and booleans are formatted; null,
/// missing, and nested values are `None`.
#[must_use]
pub fn text_property(properties: &Map<String, Value>, name: &str) -> Option<String> {
    match properties.get(name)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strips_building_designator() {
        let normalized = normalize("123 MAIN ST BLDG A", "Springfield", "IL", "62704");
        assert_eq!(normalized.primary_norm, "123 MAIN ST");
        assert_eq!(normalized.full, "123 MAIN ST BLDG A, Springfield, IL 62704");
        assert_eq!(normalized.full_norm, "123 MAIN ST, Springfield, IL 62704");
    }

    #[test]
    fn only_first_designator_is_removed() {
        assert_eq!(
            normalize_primary("1 A ST BLDG 2 BLDG 3"),
            "1 A ST BLDG 3"
        );
    }

    #[test]
    fn designator_match_is_case_sensitive() {
        assert_eq!(normalize_primary("1 A ST bldg 2"), "1 A ST bldg 2");
        assert_eq!(normalize_primary("1 A ST BLDG"), "1 A ST BLDG");
    }

    #[test]
    fn missing_fields_propagate() {
        let columns = normalize_fields(Some("9 ELM ST BLDG C"), Some("Springfield"), None, Some("62704"));
        assert_eq!(columns.address_primary_norm.as_deref(), Some("9 ELM ST"));
        assert_eq!(columns.address_full, None);
        assert_eq!(columns.address_full_norm, None);

        assert_eq!(
            normalize_fields(None, Some("a"), Some("b"), Some("c")),
            NormalizedColumns::default()
        );
    }

    #[test]
    fn text_properties() {
        let Value::Object(props) = json!({"zip": 62704, "city": "Springfield", "state": null}) else {
            unreachable!()
        };
        assert_eq!(text_property(&props, "zip").as_deref(), Some("62704"));
        assert_eq!(text_property(&props, "city").as_deref(), Some("Springfield"));
        assert_eq!(text_property(&props, "state"), None);
        assert_eq!(text_property(&props, "missing"), None);
    }
}
