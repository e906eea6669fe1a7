// mcp/id -- request identifiers and value-equivalent matching
//! Request identifiers and their canonical matching form.
//!
//! Generic JSON decoders on the other side of the wire may echo an integer id
//! back as `7.0`, as `"7"` or in scientific notation. Every id, outgoing or
//! incoming, is reduced with [`normalize_identifier`] before it touches the
//! waiter map, so equivalence is decided in exactly one place.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier carried by an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl RequestId {
    /// Canonical key used for correlation.
    pub fn key(&self) -> IdKey {
        match self {
            RequestId::Number(n) => IdKey::Integer(i128::from(*n)),
            RequestId::String(s) => normalize_str(s),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// Canonical form of an identifier.
///
/// Integral values (whatever their wire representation) collapse to
/// `Integer`; other finite numbers keep their exact `f64` bit pattern; strings
/// that do not read as numbers compare verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKey {
    Integer(i128),
    Float(u64),
    Text(String),
}

impl fmt::Display for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKey::Integer(n) => write!(f, "{n}"),
            IdKey::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            IdKey::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Reduce a wire identifier to its canonical key.
///
/// Returns `None` for values that cannot identify a request (`null`, arrays,
/// objects, booleans); such envelopes never match a waiter.
pub fn normalize_identifier(value: &Value) -> Option<IdKey> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(IdKey::Integer(i128::from(i)))
            } else if let Some(u) = n.as_u64() {
                Some(IdKey::Integer(i128::from(u)))
            } else {
                n.as_f64().map(normalize_float)
            }
        }
        Value::String(s) => Some(normalize_str(s)),
        _ => None,
    }
}

/// Whether two wire identifiers denote the same request.
pub fn ids_match(a: &Value, b: &Value) -> bool {
    match (normalize_identifier(a), normalize_identifier(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

// i128 comfortably holds every integral f64 below this bound.
const MAX_EXACT_INTEGRAL: f64 = 1.0e36;

fn normalize_float(f: f64) -> IdKey {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGRAL {
        IdKey::Integer(f as i128)
    } else {
        IdKey::Float(f.to_bits())
    }
}

fn normalize_str(s: &str) -> IdKey {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i128>() {
        return IdKey::Integer(i);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => normalize_float(f),
        _ => IdKey::Text(s.to_string()),
    }
}
