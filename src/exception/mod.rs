//! The raised-error value every handler classifies.
//!
//! An [`Exception`] wraps any `std::error::Error` together with the type
//! identity the metadata cache is keyed by, a coarse [`ExceptionKind`] used
//! by the default handler chain, and (for aggregates) its inner causes.

use crate::metadata::{ErrorMetadata, ExceptionMetadata};
use serde_json::Value;
use std::any::TypeId;
use std::error::Error;
use std::fmt;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Coarse classification consumed by the default handler chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ExceptionKind {
    Validation,
    NotFound,
    InvalidArgument,
    Cancelled,
    Timeout,
    Aggregate,
    Unclassified,
}

pub(crate) type PropertyReader = fn(&(dyn Error + Send + Sync + 'static), &str) -> Option<serde_json::Result<Value>>;

/// Compile-time description attached by the derive.
#[derive(Clone, Copy)]
pub(crate) struct Descriptor {
    pub(crate) metadata: fn() -> ExceptionMetadata,
    pub(crate) read_property: PropertyReader,
}

impl Descriptor {
    pub(crate) fn of<E: ErrorMetadata>() -> Self {
        Self {
            metadata: E::metadata,
            read_property: read_property::<E>,
        }
    }
}

fn read_property<E: ErrorMetadata>(
    error: &(dyn Error + Send + Sync + 'static),
    source: &str,
) -> Option<serde_json::Result<Value>> {
    error.downcast_ref::<E>()?.property_value(source)
}

pub struct Exception {
    error: BoxError,
    type_id: TypeId,
    type_name: &'static str,
    kind: ExceptionKind,
    descriptor: Option<Descriptor>,
    causes: Vec<Exception>,
}

impl Exception {
    /// Wraps a plain error. Its kind is inferred from well-known std, tokio
    /// and axum error types; anything else is [`ExceptionKind::Unclassified`].
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        let kind = infer_kind(&error);
        Self {
            error: Box::new(error),
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            kind,
            descriptor: None,
            causes: Vec::new(),
        }
    }

    /// Wraps an error that carries derived metadata.
    pub fn described<E>(error: E) -> Self
    where
        E: ErrorMetadata,
    {
        let mut exception = Self::new(error);
        exception.descriptor = Some(Descriptor::of::<E>());
        exception
    }

    /// Wraps an already type-erased error. Known concrete types are recovered
    /// by downcasting; everything else is keyed by the box type.
    pub fn from_boxed(error: BoxError) -> Self {
        let error = match error.downcast::<crate::validation::ValidationException>() {
            Ok(validation) => return Self::new(*validation),
            Err(other) => other,
        };
        let error = match error.downcast::<std::io::Error>() {
            Ok(io) => return Self::new(*io),
            Err(other) => other,
        };
        let error = match error.downcast::<tokio::time::error::Elapsed>() {
            Ok(elapsed) => return Self::new(*elapsed),
            Err(other) => other,
        };
        let kind = infer_kind(error.as_ref());
        Self {
            error,
            type_id: TypeId::of::<BoxError>(),
            type_name: std::any::type_name::<BoxError>(),
            kind,
            descriptor: None,
            causes: Vec::new(),
        }
    }

    /// Bundles several failures into one raised value.
    pub fn aggregate(causes: Vec<Exception>) -> Self {
        let error = AggregateError { count: causes.len() };
        Self {
            error: Box::new(error),
            type_id: TypeId::of::<AggregateError>(),
            type_name: std::any::type_name::<AggregateError>(),
            kind: ExceptionKind::Aggregate,
            descriptor: None,
            causes,
        }
    }

    /// Overrides the inferred kind.
    pub fn with_kind(mut self, kind: ExceptionKind) -> Self {
        if self.kind != ExceptionKind::Aggregate {
            self.kind = kind;
        }
        self
    }

    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.error.as_ref()
    }

    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    pub fn is<E: Error + 'static>(&self) -> bool {
        self.error.is::<E>()
    }

    pub fn causes(&self) -> &[Exception] {
        &self.causes
    }

    /// Peels aggregates of exactly one cause; larger aggregates stay whole.
    pub fn innermost(&self) -> &Exception {
        let mut current = self;
        while current.kind == ExceptionKind::Aggregate && current.causes.len() == 1 {
            current = &current.causes[0];
        }
        current
    }

    pub(crate) fn descriptor(&self) -> Option<Descriptor> {
        self.descriptor
    }

    /// Reads a mapped property off the underlying error.
    pub fn property_value(&self, source: &str) -> Option<serde_json::Result<Value>> {
        let descriptor = self.descriptor?;
        (descriptor.read_property)(self.error.as_ref(), source)
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("type", &self.type_name)
            .field("kind", &self.kind)
            .field("error", &self.error)
            .field("causes", &self.causes)
            .finish()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<E: ErrorMetadata> From<E> for Exception {
    fn from(error: E) -> Self {
        Exception::described(error)
    }
}

/// The error behind [`Exception::aggregate`].
#[derive(Debug, thiserror::Error)]
#[error("{count} errors occurred")]
pub struct AggregateError {
    pub count: usize,
}

fn infer_kind(error: &(dyn Error + 'static)) -> ExceptionKind {
    use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
    use std::io::ErrorKind as Io;

    if error.is::<crate::validation::ValidationException>() {
        return ExceptionKind::Validation;
    }
    if let Some(io) = error.downcast_ref::<std::io::Error>() {
        return match io.kind() {
            Io::NotFound => ExceptionKind::NotFound,
            Io::InvalidInput | Io::InvalidData => ExceptionKind::InvalidArgument,
            Io::TimedOut => ExceptionKind::Timeout,
            Io::Interrupted => ExceptionKind::Cancelled,
            _ => ExceptionKind::Unclassified,
        };
    }
    if error.is::<tokio::time::error::Elapsed>() {
        return ExceptionKind::Timeout;
    }
    if error.is::<std::num::ParseIntError>()
        || error.is::<std::num::ParseFloatError>()
        || error.is::<std::str::ParseBoolError>()
        || error.is::<JsonRejection>()
        || error.is::<PathRejection>()
        || error.is::<QueryRejection>()
    {
        return ExceptionKind::InvalidArgument;
    }
    ExceptionKind::Unclassified
}
