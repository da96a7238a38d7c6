use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
/// Structured library error carrying a stable kind classification, a human
/// readable message, and an optional upstream cause.
///

#[derive(Debug, ThisError)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<Box<Error>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach an upstream cause to this error.
    #[must_use]
    pub fn with_cause(mut self, cause: Self) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn type_conflict(id: &str, stored: &str, incoming: &str) -> Self {
        Self::new(
            ErrorKind::TypeConflict,
            format!("entity '{id}' is stored as '{stored}' but asserted as '{incoming}'"),
        )
    }

    pub fn missing_type(id: &str) -> Self {
        Self::new(
            ErrorKind::MissingType,
            format!("root entity '{id}' has no concrete type"),
        )
    }

    pub fn missing_id() -> Self {
        Self::new(ErrorKind::MissingId, "root entity has no id")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn invalid_pattern(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPattern, message)
    }

    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ShapeMismatch, message)
    }

    pub fn nested_entity(id: &str, key: &str) -> Self {
        Self::new(
            ErrorKind::NestedEntityAssertion,
            format!("attribute '{key}' of entity '{id}' holds a typed entity instead of a reference"),
        )
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Returns true when this error carries the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

///
/// ErrorKind
/// Stable error taxonomy surfaced by every fallible operation.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Two incompatible concrete types asserted for one entity.
    TypeConflict,
    /// A root entity was asserted without a concrete type.
    MissingType,
    /// A root entity was asserted without an id.
    MissingId,
    /// A malformed argument, e.g. a wildcard retract reference.
    InvalidArgument,
    /// A structurally malformed pattern or return clause.
    InvalidPattern,
    /// An input clause expected an array argument and got a scalar.
    ShapeMismatch,
    /// A stored attribute slot holds a typed entity instead of a reference.
    NestedEntityAssertion,
    /// The operation is not supported for the given value.
    Unsupported,
    /// An internal invariant was violated.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::TypeConflict => "type_conflict",
            Self::MissingType => "missing_type",
            Self::MissingId => "missing_id",
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidPattern => "invalid_pattern",
            Self::ShapeMismatch => "shape_mismatch",
            Self::NestedEntityAssertion => "nested_entity_assertion",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
