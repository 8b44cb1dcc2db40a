//! Integer coercion for numeric request parameters.
//!
//! Neo4j's `SKIP`/`LIMIT` only accept integers; a float such as `100.0`
//! is rejected by the engine. Every numeric value headed for a bounding clause
//! goes through [`coerce_integer`] at the API boundary.

use serde::{Deserialize, Serialize};

use crate::error::{DevgraphError, DevgraphResult};

/// Default page size for node listings.
pub const DEFAULT_PAGE_LIMIT: i64 = 100;

/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Raw numeric input as it arrives from JSON bodies or query strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawInteger {
    Int(i64),
    Float(f64),
    Text(String),
}

/// An integer parameter that tolerates integral floats (`50.0`) and numeric
/// strings, and rejects everything else with `VALIDATION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInteger")]
pub struct IntegerParam(pub i64);

impl TryFrom<RawInteger> for IntegerParam {
    type Error = DevgraphError;

    fn try_from(raw: RawInteger) -> Result<Self, Self::Error> {
        let value = match raw {
            RawInteger::Int(i) => i,
            RawInteger::Float(f) => float_to_integer("value", f)?,
            RawInteger::Text(s) => coerce_integer("value", &s)?,
        };
        Ok(IntegerParam(value))
    }
}

fn float_to_integer(name: &str, value: f64) -> DevgraphResult<i64> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(DevgraphError::validation(format!(
            "Parameter '{}' must be an integer, got {}",
            name, value
        )));
    }
    if value < i64::MIN as f64 || value > i64::MAX as f64 {
        return Err(DevgraphError::validation(format!(
            "Parameter '{}' is out of range",
            name
        )));
    }
    Ok(value.trunc() as i64)
}

/// Coerce a textual parameter to an integer.
///
/// `"50"` and `"50.0"` both yield `50`; `"50.5"`, `"abc"` and `""` fail.
pub fn coerce_integer(name: &str, raw: &str) -> DevgraphResult<i64> {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) => float_to_integer(name, f),
        Err(_) => Err(DevgraphError::validation(format!(
            "Parameter '{}' must be an integer, got '{}'",
            name, raw
        ))),
    }
}

/// Offset/limit pair, validated and ready for a bounding clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    /// Build from already-coerced integers. Negative values are rejected;
    /// the limit is clamped to [`MAX_PAGE_LIMIT`].
    pub fn new(offset: Option<i64>, limit: Option<i64>) -> DevgraphResult<Self> {
        let offset = offset.unwrap_or(0);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);

        if offset < 0 {
            return Err(DevgraphError::validation("Parameter 'offset' must be non-negative"));
        }
        if limit < 1 {
            return Err(DevgraphError::validation("Parameter 'limit' must be at least 1"));
        }

        Ok(Self {
            offset,
            limit: limit.min(MAX_PAGE_LIMIT),
        })
    }

    /// Build from raw query-string values.
    pub fn from_params(offset: Option<&str>, limit: Option<&str>) -> DevgraphResult<Self> {
        let offset = offset.map(|v| coerce_integer("offset", v)).transpose()?;
        let limit = limit.map(|v| coerce_integer("limit", v)).transpose()?;
        Self::new(offset, limit)
    }

    /// Index range of this page within a slice of `len` items.
    pub fn range(&self, len: usize) -> std::ops::Range<usize> {
        let start = (self.offset as usize).min(len);
        let end = start.saturating_add(self.limit as usize).min(len);
        start..end
    }
}

/// One page of results plus the total number of matching items.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: i64,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_integral_float_strings() {
        assert_eq!(coerce_integer("limit", "50").unwrap(), 50);
        assert_eq!(coerce_integer("limit", "50.0").unwrap(), 50);
        assert_eq!(coerce_integer("limit", " 100.0 ").unwrap(), 100);
        assert!(coerce_integer("limit", "50.5").is_err());
        assert!(coerce_integer("limit", "abc").is_err());
        assert!(coerce_integer("limit", "").is_err());
        assert!(coerce_integer("limit", "NaN").is_err());
    }

    #[test]
    fn test_integer_param_from_json() {
        let v: IntegerParam = serde_json::from_str("50.0").unwrap();
        assert_eq!(v, IntegerParam(50));
        let v: IntegerParam = serde_json::from_str("7").unwrap();
        assert_eq!(v, IntegerParam(7));
        let v: IntegerParam = serde_json::from_str("\"12.0\"").unwrap();
        assert_eq!(v, IntegerParam(12));
        assert!(serde_json::from_str::<IntegerParam>("2.5").is_err());
    }

    #[test]
    fn test_pagination_defaults_and_clamp() {
        let p = Pagination::from_params(None, None).unwrap();
        assert_eq!(p, Pagination { offset: 0, limit: DEFAULT_PAGE_LIMIT });

        let p = Pagination::from_params(Some("10.0"), Some("5000")).unwrap();
        assert_eq!(p.offset, 10);
        assert_eq!(p.limit, MAX_PAGE_LIMIT);

        assert!(Pagination::from_params(Some("-1"), None).is_err());
        assert!(Pagination::from_params(None, Some("0")).is_err());
    }

    #[test]
    fn test_page_range() {
        let p = Pagination::new(Some(4), Some(3)).unwrap();
        assert_eq!(p.range(10), 4..7);
        assert_eq!(p.range(5), 4..5);
        assert_eq!(p.range(2), 2..2);
    }
}
