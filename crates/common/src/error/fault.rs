//! Raw, unclassified failure as produced by an operation

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{ClassifiedError, FailureKind, FailureVariant};

/// Shared, opaque underlying cause
pub type SharedCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A raw fault raised by an operation before classification
///
/// Collaborators should prefer the structured fields (`kind`, `name`,
/// `status`) over free text; the classifier consults them first and only
/// falls back to keyword matching on `message` when they are absent.
#[derive(Clone, Default)]
pub struct Fault {
    /// Free-text description, the input of last resort for classification
    pub message: String,
    /// Error class name reported by the collaborator (`TimeoutError`, ...)
    pub name: Option<String>,
    /// Kind assigned by whoever raised the fault
    pub kind: Option<FailureKind>,
    pub variant: Option<FailureVariant>,
    /// HTTP status, when the fault came from a response
    pub status: Option<u16>,
    pub source: Option<SharedCause>,
    pub context: HashMap<String, String>,
}

impl Fault {
    /// An untagged fault, classified from its message
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }

    /// A fault whose kind is already known; classification keeps it as is
    pub fn tagged(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind: Some(kind), ..Self::default() }
    }

    /// Wrap any error, keeping it as the opaque cause
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self { message: error.to_string(), source: Some(Arc::new(error)), ..Self::default() }
    }

    /// Set the collaborator's error class name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the HTTP status of the failed response
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_variant(mut self, variant: FailureVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Keep an underlying error as the cause
    pub fn with_source(mut self, source: SharedCause) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("message", &self.message)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}: {}", name, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<std::io::Error> for Fault {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match error.kind() {
            ErrorKind::TimedOut => Some(FailureKind::NetworkTimeout),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => Some(FailureKind::NetworkFailure),
            ErrorKind::NotConnected | ErrorKind::AddrNotAvailable => {
                Some(FailureKind::NetworkUnavailable)
            }
            ErrorKind::PermissionDenied => Some(FailureKind::PermissionDenied),
            ErrorKind::OutOfMemory => Some(FailureKind::MemoryExhausted),
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
                Some(FailureKind::DocumentCorrupted)
            }
            _ => None,
        };
        let mut fault = Self::from_error(error);
        fault.kind = kind;
        fault
    }
}

impl From<serde_json::Error> for Fault {
    fn from(error: serde_json::Error) -> Self {
        Self::from_error(error).with_name("SerializationError")
    }
}

#[cfg(feature = "runtime")]
impl From<tokio::time::error::Elapsed> for Fault {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        let mut fault = Self::from_error(error).with_name("TimeoutError");
        fault.kind = Some(FailureKind::NetworkTimeout);
        fault
    }
}

/// Re-raising an already classified error keeps its kind
impl From<ClassifiedError> for Fault {
    fn from(error: ClassifiedError) -> Self {
        Self {
            message: error.message.clone(),
            name: None,
            kind: Some(error.kind),
            variant: error.variant,
            status: None,
            source: error.original_cause.clone(),
            context: error.context.clone(),
        }
    }
}
