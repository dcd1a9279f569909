use std::fmt;
use thiserror::Error;

pub type RotatorResult<T> = Result<T, RotatorError>;

/// Registry entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Banner,
    Slot,
    SocialGroup,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Banner => f.write_str("banner"),
            EntityKind::Slot => f.write_str("slot"),
            EntityKind::SocialGroup => f.write_str("social group"),
        }
    }
}

/// Coarse error classes exposed to the inbound request surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Internal,
}

#[derive(Error, Debug)]
pub enum RotatorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("banner '{banner_id}' is not attached to slot '{slot_id}'")]
    NotAttached { slot_id: String, banner_id: String },

    #[error("no banners available for selection")]
    EmptyCandidates,

    #[error("Store error ({context}): {source}")]
    Store {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Event queue error: {0}")]
    EventQueue(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RotatorError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        RotatorError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn already_exists(kind: EntityKind, id: impl Into<String>) -> Self {
        RotatorError::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    pub fn not_attached(slot_id: impl Into<String>, banner_id: impl Into<String>) -> Self {
        RotatorError::NotAttached {
            slot_id: slot_id.into(),
            banner_id: banner_id.into(),
        }
    }

    /// Wrap a backend failure with the operation that triggered it.
    pub fn store<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RotatorError::Store {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Prefix the operation name onto opaque failures. Domain errors pass
    /// through unchanged, and the class never changes.
    pub fn context(self, op: &str) -> Self {
        match self {
            RotatorError::Store { context, source } => RotatorError::Store {
                context: format!("{op}: {context}"),
                source,
            },
            RotatorError::EventQueue(msg) => RotatorError::EventQueue(format!("{op}: {msg}")),
            other => other,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            RotatorError::Validation(_) => ErrorClass::InvalidArgument,
            RotatorError::NotFound { .. } => ErrorClass::NotFound,
            RotatorError::NotAttached { .. } => ErrorClass::FailedPrecondition,
            _ => ErrorClass::Internal,
        }
    }
}
