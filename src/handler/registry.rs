use super::defaults;
use super::{ExceptionHandler, FnHandler, HandlerContext};
use crate::exception::{Exception, ExceptionKind};
use crate::response::ErrorResponse;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// A producer failed (returned `Err` or panicked) while handling an exception.
#[derive(Debug, Clone, thiserror::Error)]
#[error("exception handler '{handler}' failed on {exception_type}: {message}")]
pub struct HandlerFailure {
    pub handler: String,
    pub exception_type: &'static str,
    pub message: String,
}

impl From<HandlerFailure> for crate::error::ProblemError {
    fn from(failure: HandlerFailure) -> Self {
        crate::error::ProblemError::HandlerFailed {
            handler: failure.handler,
            message: failure.message,
        }
    }
}

/// Result of one dispatch.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub response: ErrorResponse,
    /// Name of the handler that produced `response`.
    pub handled_by: String,
    /// Set when the chosen producer failed and `response` is the fallback.
    pub failure: Option<HandlerFailure>,
}

/// Ordered, immutable set of exception handlers.
///
/// Built once at startup through [`HandlerRegistryBuilder`]; dispatch is a
/// linear scan in ascending order, registration order breaking ties.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Arc<[Arc<dyn ExceptionHandler>]>,
    defaults: Arc<[Arc<dyn ExceptionHandler>]>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Classifies `exception` into a response.
    ///
    /// An aggregate of exactly one cause is dispatched as that cause; any other
    /// aggregate gets the generic fallback without consulting handlers. Nothing
    /// is logged here; a failing producer is reported through
    /// [`DispatchOutcome::failure`] alongside the generic fallback response.
    pub fn dispatch(&self, exception: &Exception, ctx: &HandlerContext<'_>) -> DispatchOutcome {
        let target = exception.innermost();
        if target.kind() == ExceptionKind::Aggregate {
            return DispatchOutcome {
                response: defaults::fallback_response(target, ctx),
                handled_by: "fallback".to_string(),
                failure: None,
            };
        }

        let chosen = self
            .handlers
            .iter()
            .chain(self.defaults.iter())
            .find(|handler| handler.can_handle(target));

        let Some(handler) = chosen else {
            return DispatchOutcome {
                response: defaults::fallback_response(target, ctx),
                handled_by: "fallback".to_string(),
                failure: None,
            };
        };

        let produced = catch_unwind(AssertUnwindSafe(|| handler.handle(target, ctx)));
        let failure = match produced {
            Ok(Ok(mut response)) => {
                fill_unresolved(&mut response, target, ctx);
                return DispatchOutcome {
                    response,
                    handled_by: handler.name().to_string(),
                    failure: None,
                };
            }
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic) => panic_message(panic.as_ref()),
        };

        DispatchOutcome {
            response: defaults::unclassified_response(ctx),
            handled_by: handler.name().to_string(),
            failure: Some(HandlerFailure {
                handler: handler.name().to_string(),
                exception_type: target.type_name(),
                message: failure,
            }),
        }
    }
}

/// Code and status a handler left unset come from metadata, then the generic fallback.
fn fill_unresolved(response: &mut ErrorResponse, exception: &Exception, ctx: &HandlerContext<'_>) {
    if !response.code().is_empty() && response.status().is_some() {
        return;
    }
    let metadata = ctx.metadata_for(exception);
    if response.code().is_empty() {
        let code = metadata.error_code.as_deref().unwrap_or(defaults::INTERNAL_ERROR);
        response.set_code(code);
    }
    if response.status().is_none() {
        response.set_status(metadata.status);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Collects handlers before freezing them into a [`HandlerRegistry`].
pub struct HandlerRegistryBuilder {
    handlers: Vec<Arc<dyn ExceptionHandler>>,
    with_defaults: bool,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            with_defaults: true,
        }
    }

    pub fn handler<H: ExceptionHandler>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn handler_arc(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Registers a closure pair.
    pub fn on<P, F>(self, name: impl Into<String>, order: i32, predicate: P, producer: F) -> Self
    where
        P: Fn(&Exception) -> bool + Send + Sync + 'static,
        F: Fn(&Exception, &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> + Send + Sync + 'static,
    {
        self.handler(FnHandler::new(name, order, predicate, producer))
    }

    /// Registers a producer for one concrete error type.
    pub fn on_type<E, F>(self, order: i32, producer: F) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(&E, &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> + Send + Sync + 'static,
    {
        self.handler(FnHandler::for_type::<E, F>(order, producer))
    }

    /// Drops the built-in chain; unmatched exceptions go straight to the fallback.
    pub fn without_defaults(mut self) -> Self {
        self.with_defaults = false;
        self
    }

    pub fn build(mut self) -> HandlerRegistry {
        // Stable sort: equal orders keep registration order.
        self.handlers.sort_by_key(|h| h.order());
        let defaults = if self.with_defaults {
            defaults::default_chain()
        } else {
            Vec::new()
        };
        HandlerRegistry {
            handlers: self.handlers.into(),
            defaults: defaults.into(),
        }
    }
}

impl Default for HandlerRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorHandlingOptions;
    use crate::localization::NoopLocalizer;
    use crate::metadata::MetadataCache;
    use axum::http::StatusCode;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[derive(Debug, thiserror::Error)]
    #[error("other")]
    struct Other;

    fn run(registry: &HandlerRegistry, exception: &Exception) -> DispatchOutcome {
        let metadata = MetadataCache::new();
        let options = ErrorHandlingOptions::default();
        let ctx = HandlerContext {
            metadata: &metadata,
            localizer: &NoopLocalizer,
            options: &options,
        };
        registry.dispatch(exception, &ctx)
    }

    fn respond(code: &'static str) -> impl Fn(&Exception, &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> {
        move |_, _| Ok(ErrorResponse::new(code).with_status(StatusCode::CONFLICT))
    }

    #[test]
    fn test_lowest_order_wins() {
        let registry = HandlerRegistry::builder()
            .on("late", 10, |_| true, respond("LATE"))
            .on("early", -5, |_| true, respond("EARLY"))
            .on("middle", 0, |_| true, respond("MIDDLE"))
            .build();

        let outcome = run(&registry, &Exception::new(Boom));
        assert_eq!(outcome.response.code(), "EARLY");
        assert_eq!(outcome.handled_by, "early");
    }

    #[test]
    fn test_equal_order_first_registered_wins() {
        let registry = HandlerRegistry::builder()
            .on("first", 1, |_| true, respond("FIRST"))
            .on("second", 1, |_| true, respond("SECOND"))
            .build();

        assert_eq!(run(&registry, &Exception::new(Boom)).response.code(), "FIRST");
    }

    #[test]
    fn test_predicate_filters_handlers() {
        let registry = HandlerRegistry::builder()
            .on_type::<Other, _>(0, |_, _| Ok(ErrorResponse::new("OTHER")))
            .on_type::<Boom, _>(5, |err, _| Ok(ErrorResponse::new("BOOM").with_message(err.to_string())))
            .build();

        let outcome = run(&registry, &Exception::new(Boom));
        assert_eq!(outcome.response.code(), "BOOM");
        assert_eq!(outcome.response.message(), Some("boom"));
    }

    #[test]
    fn test_unmatched_falls_back_to_generic() {
        let registry = HandlerRegistry::builder().build();
        let outcome = run(&registry, &Exception::new(Boom));
        assert_eq!(outcome.response.code(), defaults::INTERNAL_ERROR);
        assert_eq!(outcome.response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(outcome.response.message(), Some(defaults::GENERIC_MESSAGE));
        assert!(outcome.failure.is_none());
    }

    #[test]
    fn test_single_cause_aggregate_equals_cause() {
        let registry = HandlerRegistry::builder()
            .on_type::<Boom, _>(0, |_, _| Ok(ErrorResponse::new("BOOM").with_status(StatusCode::BAD_GATEWAY)))
            .build();

        let direct = run(&registry, &Exception::new(Boom));
        let wrapped = run(&registry, &Exception::aggregate(vec![Exception::new(Boom)]));
        assert_eq!(direct.response, wrapped.response);
    }

    #[test]
    fn test_multi_cause_aggregate_is_generic() {
        let registry = HandlerRegistry::builder()
            .on_type::<Boom, _>(0, |_, _| Ok(ErrorResponse::new("BOOM")))
            .build();

        let outcome = run(
            &registry,
            &Exception::aggregate(vec![Exception::new(Boom), Exception::new(Boom)]),
        );
        let generic = run(&registry, &Exception::new(Other));
        assert_eq!(outcome.response, generic.response);
        assert_eq!(outcome.response.code(), defaults::INTERNAL_ERROR);
    }

    #[test]
    fn test_catch_all_handler_does_not_claim_multi_cause_aggregate() {
        let registry = HandlerRegistry::builder()
            .on("catch_all", 0, |_| true, respond("CAUGHT"))
            .build();

        let outcome = run(
            &registry,
            &Exception::aggregate(vec![Exception::new(Boom), Exception::new(Other)]),
        );
        assert_eq!(outcome.response.code(), defaults::INTERNAL_ERROR);
        assert_eq!(outcome.response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(outcome.handled_by, "fallback");

        let single = run(&registry, &Exception::aggregate(vec![Exception::new(Boom)]));
        assert_eq!(single.response.code(), "CAUGHT");
    }

    #[test]
    fn test_failing_producer_reports_failure() {
        let registry = HandlerRegistry::builder()
            .on("broken", 0, |_| true, |_, _| anyhow::bail!("misconfigured"))
            .build();

        let outcome = run(&registry, &Exception::new(Boom));
        assert_eq!(outcome.response.code(), defaults::INTERNAL_ERROR);
        let failure = outcome.failure.expect("failure recorded");
        assert_eq!(failure.handler, "broken");
        assert!(failure.message.contains("misconfigured"));
    }

    #[test]
    fn test_panicking_producer_reports_failure() {
        let registry = HandlerRegistry::builder()
            .on("panics", 0, |_| true, |_, _| panic!("handler exploded"))
            .build();

        let outcome = run(&registry, &Exception::new(Boom));
        assert_eq!(outcome.response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(outcome.failure.unwrap().message.contains("handler exploded"));
    }

    #[test]
    fn test_unset_code_filled_from_fallback() {
        let registry = HandlerRegistry::builder()
            .on("blank", 0, |_| true, |_, _| Ok(ErrorResponse::default()))
            .build();
        let outcome = run(&registry, &Exception::new(Boom));
        assert_eq!(outcome.response.code(), defaults::INTERNAL_ERROR);
        assert_eq!(outcome.response.status(), None);
    }
}
