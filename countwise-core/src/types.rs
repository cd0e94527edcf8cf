//! Core domain types for countwise
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Counter** | A named, persisted numeric value mutated by relative deltas |
//! | **Entry** | Any stored key: a counter, a flag, or a string |
//! | **Enablement flag** | The master switch gating all collection and reporting |
//! | **Installation id** | A random token generated once per install |
//! | **Set-once** | A persisted value that is never overwritten after the first write |

use std::fmt;

/// Value returned by counter mutations while analytics are disabled.
pub const DISABLED_SENTINEL: i64 = -1;

/// Float flavour of [`DISABLED_SENTINEL`].
pub const DISABLED_SENTINEL_FLOAT: f64 = -1.0;

/// Report key carrying the installation id.
pub const KEY_INSTALLATION_ID: &str = "_installation_id";

/// Report key carrying the platform version marker.
pub const KEY_PLATFORM_VERSION: &str = "_android_version";

// ============================================
// Stored values
// ============================================

/// Kind of value a key holds. A key keeps one kind for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    Text,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Bool => "bool",
            ValueKind::Text => "text",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(ValueKind::Int),
            "float" => Ok(ValueKind::Float),
            "bool" => Ok(ValueKind::Bool),
            "text" => Ok(ValueKind::Text),
            _ => Err(format!("unknown value kind: {}", s)),
        }
    }
}

/// A value held in the counter store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl StoredValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            StoredValue::Int(_) => ValueKind::Int,
            StoredValue::Float(_) => ValueKind::Float,
            StoredValue::Bool(_) => ValueKind::Bool,
            StoredValue::Text(_) => ValueKind::Text,
        }
    }

    /// Render the value the way it appears in a report.
    ///
    /// Floats always carry a fractional part (`3.0`, not `3`) so they stay
    /// distinguishable from integer counters on the receiving side.
    pub fn render(&self) -> String {
        match self {
            StoredValue::Int(v) => v.to_string(),
            StoredValue::Float(v) => format!("{:?}", v),
            StoredValue::Bool(v) => v.to_string(),
            StoredValue::Text(v) => v.clone(),
        }
    }
}

impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kind_roundtrip() {
        for kind in [
            ValueKind::Int,
            ValueKind::Float,
            ValueKind::Bool,
            ValueKind::Text,
        ] {
            assert_eq!(kind.as_str().parse::<ValueKind>().unwrap(), kind);
        }
        assert!("double".parse::<ValueKind>().is_err());
    }

    #[test]
    fn test_render() {
        assert_eq!(StoredValue::Int(-3).render(), "-3");
        assert_eq!(StoredValue::Float(3.0).render(), "3.0");
        assert_eq!(StoredValue::Float(0.25).render(), "0.25");
        assert_eq!(StoredValue::Bool(true).render(), "true");
        assert_eq!(StoredValue::Text("a b".into()).render(), "a b");
    }
}
