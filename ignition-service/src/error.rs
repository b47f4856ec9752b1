//! Errors related to building service graphs and running lifecycle hooks.

use derive_more::Constructor;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

/// Shared pointer to any error which might be raised by external code, e.g. lifecycle hooks or
/// service providers.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Errors raised when building a [ServiceGraph](crate::graph::ServiceGraph).
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum GraphError {
    #[error("Service name cannot be empty: '{0}'")]
    InvalidServiceName(String),
    #[error("Attempted to register a duplicated service with name: {0}")]
    DuplicateServiceName(String),
    #[error("Service '{service}' requires unknown prerequisite: {prerequisite}")]
    UnknownPrerequisite {
        service: String,
        prerequisite: String,
    },
    #[error("Service prerequisites form a cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
}

/// Errors ending the startup sequence.
#[derive(Error, Clone, Debug)]
pub enum StartupError {
    #[error("Fatal startup failure in service '{service}': {error}")]
    Fatal {
        service: String,
        #[source]
        error: ErrorPtr,
    },
    #[error("Service '{service}' failed to start: {error}")]
    ServiceFailed {
        service: String,
        #[source]
        error: ErrorPtr,
    },
    #[error("Startup has been cancelled")]
    Cancelled,
}

impl From<ServiceFailure> for StartupError {
    fn from(value: ServiceFailure) -> Self {
        match value.kind {
            FailureKind::Fatal => Self::Fatal {
                service: value.service,
                error: value.error,
            },
            FailureKind::Transient => Self::ServiceFailed {
                service: value.service,
                error: value.error,
            },
        }
    }
}

/// Class of a lifecycle hook failure.
#[derive(Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum FailureKind {
    /// The application must not continue - aborts the whole startup sequence.
    Fatal,
    /// Fails the service and its dependents, but is only logged for services which are not
    /// awaited on startup.
    Transient,
}

/// Error returned from lifecycle hooks. Any [Error] can be converted into a transient
/// [HookError] with `?`, while fatal ones need to be created explicitly with [HookError::fatal].
pub struct HookError {
    kind: FailureKind,
    error: ErrorPtr,
}

impl HookError {
    #[inline]
    pub fn new(kind: FailureKind, error: ErrorPtr) -> Self {
        Self { kind, error }
    }

    pub fn fatal<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::new(FailureKind::Fatal, Arc::new(error))
    }

    pub fn transient<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::new(FailureKind::Transient, Arc::new(error))
    }

    #[inline]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    #[inline]
    pub fn error(&self) -> &ErrorPtr {
        &self.error
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.kind == FailureKind::Fatal
    }
}

impl<E: Error + Send + Sync + 'static> From<E> for HookError {
    fn from(value: E) -> Self {
        Self::transient(value)
    }
}

impl Debug for HookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookError")
            .field("kind", &self.kind)
            .field("error", &self.error)
            .finish()
    }
}

impl Display for HookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.error, f)
    }
}

/// Raised in place of a lifecycle hook which panicked.
#[derive(Error, Clone, Eq, PartialEq, Debug)]
#[error("Lifecycle hook panicked: {0}")]
pub struct HookPanicked(pub String);

/// A failure recorded against the service whose hook failed. Dependents which didn't start because
/// of it carry the same failure as the cause.
#[derive(Clone, Debug, Constructor)]
pub struct ServiceFailure {
    pub service: String,
    pub kind: FailureKind,
    pub error: ErrorPtr,
}

impl ServiceFailure {
    pub(crate) fn from_hook_error(service: &str, error: HookError) -> Self {
        Self::new(service.to_string(), error.kind, error.error)
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.kind == FailureKind::Fatal
    }
}

impl Display for ServiceFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}): {}", self.service, self.kind, self.error)
    }
}
