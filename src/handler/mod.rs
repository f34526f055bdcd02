use crate::config::ErrorHandlingOptions;
use crate::exception::Exception;
use crate::localization::Localizer;
use crate::metadata::{ExceptionMetadata, MetadataCache};
use crate::response::ErrorResponse;
use std::sync::Arc;

pub mod defaults;
mod registry;

pub use registry::{DispatchOutcome, HandlerFailure, HandlerRegistry, HandlerRegistryBuilder};

/// Shared collaborators available to every handler.
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    pub metadata: &'a MetadataCache,
    pub localizer: &'a dyn Localizer,
    pub options: &'a ErrorHandlingOptions,
}

impl<'a> HandlerContext<'a> {
    pub fn metadata_for(&self, exception: &Exception) -> Arc<ExceptionMetadata> {
        self.metadata.for_exception(exception)
    }

    /// Localized message for `code`, or `default`.
    pub fn message(&self, code: &str, default: &str) -> String {
        self.localizer
            .localize(code, default)
            .unwrap_or_else(|| default.to_string())
    }

    /// Overlays declared metadata onto a response: the declared code and status
    /// replace the handler's, and mapped properties are appended in order.
    pub fn apply_metadata(&self, exception: &Exception, response: &mut ErrorResponse) {
        let metadata = self.metadata_for(exception);
        if let Some(code) = &metadata.error_code {
            response.set_code(code.clone());
        }
        if let Some(status) = metadata.status {
            response.set_status(Some(status));
        }
        for mapping in &metadata.properties {
            // `None`: no reader is known for the type yet, so there is no value to write.
            match self.metadata.read_property(exception, mapping.source) {
                Some(Ok(value)) if !value.is_null() || mapping.include_if_null => {
                    response.add_property(mapping.output_name.clone(), value);
                }
                Some(Ok(_)) | None => {}
                Some(Err(err)) => {
                    response.add_property_result(mapping.output_name.clone(), Err(err));
                }
            }
        }
    }
}

/// Recognizes a class of errors and produces a response for it.
///
/// Handlers run in ascending [`order`](ExceptionHandler::order); the first
/// whose [`can_handle`](ExceptionHandler::can_handle) returns true wins.
///
/// # Example
/// ```
/// use problemkit::handler::{ExceptionHandler, HandlerContext};
/// use problemkit::{Exception, ErrorResponse};
///
/// struct IoHandler;
///
/// impl ExceptionHandler for IoHandler {
///     fn can_handle(&self, exception: &Exception) -> bool {
///         exception.is::<std::io::Error>()
///     }
///
///     fn handle(&self, _: &Exception, _: &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> {
///         Ok(ErrorResponse::new("IO_FAILURE"))
///     }
/// }
/// ```
pub trait ExceptionHandler: Send + Sync + 'static {
    /// Lower runs earlier.
    fn order(&self) -> i32 {
        0
    }

    fn can_handle(&self, exception: &Exception) -> bool;

    fn handle(&self, exception: &Exception, ctx: &HandlerContext<'_>) -> anyhow::Result<ErrorResponse>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

type Predicate = Box<dyn Fn(&Exception) -> bool + Send + Sync>;
type Producer = Box<dyn Fn(&Exception, &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> + Send + Sync>;

/// A handler assembled from closures.
pub struct FnHandler {
    name: String,
    order: i32,
    predicate: Predicate,
    producer: Producer,
}

impl FnHandler {
    pub fn new<P, F>(name: impl Into<String>, order: i32, predicate: P, producer: F) -> Self
    where
        P: Fn(&Exception) -> bool + Send + Sync + 'static,
        F: Fn(&Exception, &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            order,
            predicate: Box::new(predicate),
            producer: Box::new(producer),
        }
    }

    /// Matches errors of type `E` and hands the producer the concrete value.
    pub fn for_type<E, F>(order: i32, producer: F) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(&E, &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> + Send + Sync + 'static,
    {
        Self::new(
            std::any::type_name::<E>(),
            order,
            |exception| exception.is::<E>(),
            move |exception, ctx| match exception.downcast_ref::<E>() {
                Some(error) => producer(error, ctx),
                None => anyhow::bail!("handler for {} received another type", std::any::type_name::<E>()),
            },
        )
    }
}

impl ExceptionHandler for FnHandler {
    fn order(&self) -> i32 {
        self.order
    }

    fn can_handle(&self, exception: &Exception) -> bool {
        (self.predicate)(exception)
    }

    fn handle(&self, exception: &Exception, ctx: &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> {
        (self.producer)(exception, ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
