use crate::key::Key;
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Every failure the store can surface to a caller.
/// Raised synchronously at the offending call; a failed mutation leaves the
/// session's in-flight branch exactly as it was before the call.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum Error {
    #[error("schema rejected: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("entity '{entity}' requires an explicit '{id_attribute}' value")]
    MissingId {
        entity: String,
        id_attribute: String,
    },

    #[error("entity '{entity}' already contains id {id}")]
    DuplicateId { entity: String, id: Key },

    #[error("entity '{entity}' has no row with id {id}")]
    NotFound { entity: String, id: Key },

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("entity '{entity}' has no field or accessor '{field}'")]
    UnknownField { entity: String, field: String },

    #[error("session state has already been read; mutations are closed")]
    SessionClosed,

    #[error("index invariant violated: {0}")]
    Invariant(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    pub(crate) fn not_found(entity: &str, id: &Key) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.clone(),
        }
    }

    pub(crate) fn unknown_field(entity: &str, field: &str) -> Self {
        Self::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }

    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Schema(_) => ErrorClass::Schema,
            Self::Validation(_) | Self::MissingId { .. } => ErrorClass::Validation,
            Self::DuplicateId { .. } => ErrorClass::Conflict,
            Self::NotFound { .. } | Self::UnknownEntity(_) | Self::UnknownField { .. } => {
                ErrorClass::NotFound
            }
            Self::SessionClosed => ErrorClass::Unsupported,
            Self::Invariant(_) => ErrorClass::InvariantViolation,
            Self::Config(_) => ErrorClass::Config,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Schema(_) | Self::UnknownEntity(_) => ErrorOrigin::Registry,
            Self::Validation(_) | Self::UnknownField { .. } | Self::SessionClosed => {
                ErrorOrigin::Session
            }
            Self::MissingId { .. } | Self::DuplicateId { .. } | Self::NotFound { .. } => {
                ErrorOrigin::Table
            }
            Self::Invariant(_) => ErrorOrigin::Index,
            Self::Config(_) => ErrorOrigin::Config,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {self}", self.origin(), self.class())
    }
}

///
/// ErrorClass
/// Coarse taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Schema,
    Validation,
    Conflict,
    NotFound,
    InvariantViolation,
    Unsupported,
    Config,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Schema => "schema",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::InvariantViolation => "invariant_violation",
            Self::Unsupported => "unsupported",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Which layer raised the error.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Registry,
    Table,
    Index,
    Session,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Registry => "registry",
            Self::Table => "table",
            Self::Index => "index",
            Self::Session => "session",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_taxonomy() {
        let dup = Error::DuplicateId {
            entity: "Book".to_string(),
            id: Key::from("B1"),
        };
        assert_eq!(dup.class(), ErrorClass::Conflict);
        assert_eq!(dup.origin(), ErrorOrigin::Table);

        let missing = Error::not_found("Publisher", &Key::Int(1));
        assert!(missing.is_not_found());
        assert_eq!(
            missing.display_with_class(),
            "table:not_found: entity 'Publisher' has no row with id 1"
        );
    }

    #[test]
    fn schema_error_joins_every_problem() {
        let err = Error::Schema(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(err.to_string(), "schema rejected: first; second");
        assert_eq!(err.origin(), ErrorOrigin::Registry);
    }
}
