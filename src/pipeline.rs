//! Composition root: dispatch, customize, log, encode.

use crate::config::ErrorHandlingOptions;
use crate::error::Result;
use crate::exception::Exception;
use crate::handler::{ExceptionHandler, HandlerContext, HandlerRegistry, HandlerRegistryBuilder, defaults};
use crate::hooks::{ErrorLogger, LoggingFilter, ResponseCustomizer};
use crate::localization::{Localizer, NoopLocalizer};
use crate::metadata::{ExceptionMetadata, MetadataCache};
use crate::response::{ErrorResponse, ResponseEncoder};
use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, Response, StatusCode, header};
use std::sync::Arc;

/// Turns raised exceptions into encoded HTTP responses.
///
/// Everything inside is immutable after [`ErrorPipelineBuilder::build`] and
/// shared behind `Arc`, so one pipeline serves all requests concurrently.
///
/// # Example
/// ```
/// use problemkit::{ErrorPipeline, ErrorResponse, Exception};
///
/// let pipeline = ErrorPipeline::builder()
///     .customizer(|response: &mut ErrorResponse| {
///         response.add_property("service", "users");
///     })
///     .build();
///
/// let response = pipeline.handle(&Exception::new(std::io::Error::from(std::io::ErrorKind::NotFound)));
/// assert_eq!(response.code(), "NOT_FOUND");
/// ```
#[derive(Clone)]
pub struct ErrorPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    registry: HandlerRegistry,
    metadata: MetadataCache,
    localizer: Arc<dyn Localizer>,
    customizers: Vec<Arc<dyn ResponseCustomizer>>,
    logger: ErrorLogger,
    encoder: ResponseEncoder,
    options: ErrorHandlingOptions,
}

impl ErrorPipeline {
    pub fn builder() -> ErrorPipelineBuilder {
        ErrorPipelineBuilder::new()
    }

    pub fn options(&self) -> &ErrorHandlingOptions {
        &self.inner.options
    }

    pub fn encoder(&self) -> &ResponseEncoder {
        &self.inner.encoder
    }

    pub fn localizer(&self) -> &dyn Localizer {
        self.inner.localizer.as_ref()
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.inner.metadata
    }

    /// Dispatches, runs customizers in registration order, then logs.
    pub fn handle(&self, exception: &Exception) -> ErrorResponse {
        let inner = &self.inner;
        let ctx = HandlerContext {
            metadata: &inner.metadata,
            localizer: inner.localizer.as_ref(),
            options: &inner.options,
        };

        let outcome = inner.registry.dispatch(exception, &ctx);
        tracing::debug!(
            handler = %outcome.handled_by,
            error_type = exception.type_name(),
            "Exception classified"
        );

        let mut response = outcome.response;
        self.customize(&mut response);

        match &outcome.failure {
            Some(failure) => inner.logger.log_handler_failure(failure),
            None => {
                inner.logger.log(&response, exception);
            }
        }
        response
    }

    pub fn customize(&self, response: &mut ErrorResponse) {
        for customizer in &self.inner.customizers {
            customizer.customize(response);
        }
    }

    /// Encodes a response into `(status, body)`.
    pub fn encode(&self, response: &ErrorResponse) -> Result<(StatusCode, Bytes)> {
        let body = self.inner.encoder.encode(response)?;
        Ok((response.effective_status(), Bytes::from(body)))
    }

    /// Classifies and encodes in one step, always yielding a well-formed response.
    ///
    /// An encoding failure is logged and answered with the bare generic error.
    pub fn render(&self, exception: &Exception) -> Response<Body> {
        let response = self.handle(exception);
        self.render_response(&response)
    }

    pub fn render_response(&self, response: &ErrorResponse) -> Response<Body> {
        let (status, body) = match self.encode(response) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::error!("Failed to encode error response {}: {}", response.code(), err);
                let generic = ErrorResponse::new(defaults::INTERNAL_ERROR)
                    .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                    .with_message(defaults::GENERIC_MESSAGE);
                // Only fixed fields: cannot fail.
                let body = self.inner.encoder.encode(&generic).unwrap_or_default();
                (StatusCode::INTERNAL_SERVER_ERROR, Bytes::from(body))
            }
        };
        self.http_response(status, axum::http::HeaderMap::new(), body)
    }

    pub(crate) fn http_response(
        &self,
        status: StatusCode,
        headers: axum::http::HeaderMap,
        body: Bytes,
    ) -> Response<Body> {
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        let content_type = HeaderValue::from_str(&self.inner.options.content_type)
            .unwrap_or(HeaderValue::from_static("application/json"));
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        response
    }
}

pub struct ErrorPipelineBuilder {
    registry: HandlerRegistryBuilder,
    metadata: MetadataCache,
    localizer: Arc<dyn Localizer>,
    customizers: Vec<Arc<dyn ResponseCustomizer>>,
    filters: Vec<Arc<dyn LoggingFilter>>,
    options: ErrorHandlingOptions,
}

impl ErrorPipelineBuilder {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::builder(),
            metadata: MetadataCache::new(),
            localizer: Arc::new(NoopLocalizer),
            customizers: Vec::new(),
            filters: Vec::new(),
            options: ErrorHandlingOptions::default(),
        }
    }

    pub fn options(mut self, options: ErrorHandlingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn handler<H: ExceptionHandler>(mut self, handler: H) -> Self {
        self.registry = self.registry.handler(handler);
        self
    }

    pub fn on_type<E, F>(mut self, order: i32, producer: F) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(&E, &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> + Send + Sync + 'static,
    {
        self.registry = self.registry.on_type::<E, F>(order, producer);
        self
    }

    pub fn without_default_handlers(mut self) -> Self {
        self.registry = self.registry.without_defaults();
        self
    }

    /// Metadata for a type that cannot derive it.
    pub fn declare<E: 'static>(self, metadata: ExceptionMetadata) -> Self {
        self.metadata.declare::<E>(metadata);
        self
    }

    /// Resolves a derived type's metadata at startup, so plain
    /// [`Exception::new`] wrappings of it are classified from the first request.
    pub fn register<E: crate::metadata::ErrorMetadata>(self) -> Self {
        self.metadata.register::<E>();
        self
    }

    pub fn localizer<L: Localizer>(mut self, localizer: L) -> Self {
        self.localizer = Arc::new(localizer);
        self
    }

    pub fn customizer<C: ResponseCustomizer>(mut self, customizer: C) -> Self {
        self.customizers.push(Arc::new(customizer));
        self
    }

    pub fn logging_filter<F: LoggingFilter>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn build(self) -> ErrorPipeline {
        let encoder = ResponseEncoder::new(self.options.field_names.clone());
        let logger = ErrorLogger::new(self.options.logging.clone(), self.filters);
        ErrorPipeline {
            inner: Arc::new(PipelineInner {
                registry: self.registry.build(),
                metadata: self.metadata,
                localizer: self.localizer,
                customizers: self.customizers,
                logger,
                encoder,
                options: self.options,
            }),
        }
    }
}

impl Default for ErrorPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
