use crate::value::Value;
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// Key
///
/// Identifier of one row within its entity table.
/// Numeric keys are allocated by the table when omitted; text keys must
/// always be supplied by the caller.
///

#[derive(Clone, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(untagged)]
pub enum Key {
    #[display("{_0}")]
    Int(i64),

    #[display("{_0}")]
    Text(String),
}

impl Key {
    #[must_use]
    pub const fn kind(&self) -> IdKind {
        match self {
            Self::Int(_) => IdKind::Numeric,
            Self::Text(_) => IdKind::Text,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Interpret a stored field value as a key.
    ///
    /// Only `Int` and `Text` values are key-shaped; everything else
    /// (including `Null`) yields `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(Self::Int(*n)),
            Value::Text(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) => Value::Int(*n),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

///
/// IdKind
///
/// Declared shape of an entity's id attribute.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    #[default]
    Numeric,
    Text,
}

impl IdKind {
    #[must_use]
    pub const fn auto_increments(self) -> bool {
        matches!(self, Self::Numeric)
    }
}
