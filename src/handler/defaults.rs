//! Built-in handler chain consulted after every registered handler declined.
//!
//! | kind            | status | code                |
//! |-----------------|--------|---------------------|
//! | Validation      | 400    | `VALIDATION_FAILED` |
//! | NotFound        | 404    | `NOT_FOUND`         |
//! | InvalidArgument | 400    | `BAD_REQUEST`       |
//! | Cancelled       | 499    | `REQUEST_CANCELLED` |
//! | Timeout         | 408    | `REQUEST_TIMEOUT`   |
//! | anything else   | 500    | `INTERNAL_ERROR`    |
//!
//! Declared metadata overrides the code and status in every row.

use super::{ExceptionHandler, HandlerContext};
use crate::exception::{Exception, ExceptionKind};
use crate::response::ErrorResponse;
use crate::validation::{ValidationAggregator, ValidationException};
use axum::http::StatusCode;
use std::sync::Arc;

pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const BAD_REQUEST: &str = "BAD_REQUEST";
pub const REQUEST_CANCELLED: &str = "REQUEST_CANCELLED";
pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";

pub const GENERIC_MESSAGE: &str = "An unexpected error occurred";

/// Non-standard "client closed request".
fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
}

pub(crate) fn default_chain() -> Vec<Arc<dyn ExceptionHandler>> {
    vec![
        Arc::new(ValidationHandler),
        Arc::new(KindHandler {
            kind: ExceptionKind::NotFound,
            status: StatusCode::NOT_FOUND,
            code: NOT_FOUND,
        }),
        Arc::new(KindHandler {
            kind: ExceptionKind::InvalidArgument,
            status: StatusCode::BAD_REQUEST,
            code: BAD_REQUEST,
        }),
        Arc::new(KindHandler {
            kind: ExceptionKind::Cancelled,
            status: client_closed_request(),
            code: REQUEST_CANCELLED,
        }),
        Arc::new(KindHandler {
            kind: ExceptionKind::Timeout,
            status: StatusCode::REQUEST_TIMEOUT,
            code: REQUEST_TIMEOUT,
        }),
    ]
}

/// Overlays metadata, then localizes the message under the final code.
fn finish(
    exception: &Exception,
    ctx: &HandlerContext<'_>,
    mut response: ErrorResponse,
    default_message: &str,
) -> ErrorResponse {
    ctx.apply_metadata(exception, &mut response);
    let message = ctx.message(response.code(), default_message);
    response.set_message(Some(message));
    response
}

/// Response for exceptions nothing else classified, including aggregates of
/// several causes.
pub(crate) fn fallback_response(exception: &Exception, ctx: &HandlerContext<'_>) -> ErrorResponse {
    let declared = ctx.metadata_for(exception).error_code.is_some();
    let message = if declared || ctx.options.expose_internal_messages {
        exception.to_string()
    } else {
        GENERIC_MESSAGE.to_string()
    };
    let response = ErrorResponse::new(INTERNAL_ERROR).with_status(StatusCode::INTERNAL_SERVER_ERROR);
    finish(exception, ctx, response, &message)
}

/// Response used when a handler itself failed; reveals nothing about the exception.
pub(crate) fn unclassified_response(ctx: &HandlerContext<'_>) -> ErrorResponse {
    ErrorResponse::new(INTERNAL_ERROR)
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
        .with_message(ctx.message(INTERNAL_ERROR, GENERIC_MESSAGE))
}

struct ValidationHandler;

impl ExceptionHandler for ValidationHandler {
    fn order(&self) -> i32 {
        i32::MAX
    }

    fn can_handle(&self, exception: &Exception) -> bool {
        exception.kind() == ExceptionKind::Validation
    }

    fn handle(&self, exception: &Exception, ctx: &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> {
        let mut response = ErrorResponse::new(VALIDATION_FAILED).with_status(StatusCode::BAD_REQUEST);
        if let Some(validation) = exception.downcast_ref::<ValidationException>() {
            ValidationAggregator::new(ctx.options.error_code_strategy, ctx.localizer)
                .aggregate(&validation.failures)
                .apply_to(&mut response);
        }
        Ok(finish(exception, ctx, response, &exception.to_string()))
    }

    fn name(&self) -> &str {
        "ValidationHandler"
    }
}

struct KindHandler {
    kind: ExceptionKind,
    status: StatusCode,
    code: &'static str,
}

impl ExceptionHandler for KindHandler {
    fn order(&self) -> i32 {
        i32::MAX
    }

    fn can_handle(&self, exception: &Exception) -> bool {
        exception.kind() == self.kind
    }

    fn handle(&self, exception: &Exception, ctx: &HandlerContext<'_>) -> anyhow::Result<ErrorResponse> {
        let response = ErrorResponse::new(self.code).with_status(self.status);
        Ok(finish(exception, ctx, response, &exception.to_string()))
    }

    fn name(&self) -> &str {
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorHandlingOptions;
    use crate::handler::HandlerRegistry;
    use crate::localization::{CatalogLocalizer, Localizer, NoopLocalizer};
    use crate::metadata::MetadataCache;
    use crate::validation::{RuleKind, ValidationFailure};

    #[derive(Debug, thiserror::Error, crate::ErrorMetadata)]
    #[error("User with ID '{user_id}' was not found")]
    #[error_meta(code = "USER_NOT_FOUND", status = 404)]
    struct UserNotFound {
        #[error_property]
        user_id: String,
        #[error_property]
        tenant: Option<String>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("connection string postgres://admin:secret@db leaked")]
    struct Leaky;

    fn dispatch_with(
        exception: &Exception,
        options: &ErrorHandlingOptions,
        localizer: &dyn Localizer,
    ) -> ErrorResponse {
        let metadata = MetadataCache::new();
        let ctx = HandlerContext {
            metadata: &metadata,
            localizer,
            options,
        };
        HandlerRegistry::builder().build().dispatch(exception, &ctx).response
    }

    fn dispatch(exception: &Exception) -> ErrorResponse {
        dispatch_with(exception, &ErrorHandlingOptions::default(), &NoopLocalizer)
    }

    #[test]
    fn test_declared_metadata_drives_unclassified_error() {
        let response = dispatch(&Exception::from(UserNotFound {
            user_id: "user-1".into(),
            tenant: None,
        }));

        assert_eq!(response.code(), "USER_NOT_FOUND");
        assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(response.message(), Some("User with ID 'user-1' was not found"));
        assert_eq!(response.property("userId"), Some(&serde_json::json!("user-1")));
        // null without include_if_null is dropped
        assert!(response.property("tenant").is_none());
    }

    #[test]
    fn test_internal_message_hidden_by_default() {
        let response = dispatch(&Exception::new(Leaky));
        assert_eq!(response.message(), Some(GENERIC_MESSAGE));

        let options = ErrorHandlingOptions {
            expose_internal_messages: true,
            ..ErrorHandlingOptions::default()
        };
        let response = dispatch_with(&Exception::new(Leaky), &options, &NoopLocalizer);
        assert!(response.message().unwrap().contains("leaked"));
    }

    #[test]
    fn test_kind_rows() {
        let cases = [
            (std::io::ErrorKind::NotFound, StatusCode::NOT_FOUND, NOT_FOUND),
            (std::io::ErrorKind::InvalidInput, StatusCode::BAD_REQUEST, BAD_REQUEST),
            (std::io::ErrorKind::TimedOut, StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT),
            (std::io::ErrorKind::Interrupted, client_closed_request(), REQUEST_CANCELLED),
        ];
        for (io_kind, status, code) in cases {
            let response = dispatch(&Exception::new(std::io::Error::new(io_kind, "io")));
            assert_eq!(response.status(), Some(status));
            assert_eq!(response.code(), code);
            assert_eq!(response.message(), Some("io"));
        }
    }

    #[test]
    fn test_validation_exception() {
        let exception = Exception::new(ValidationException::new(vec![
            ValidationFailure::property("Email", RuleKind::Email, "must be a valid email"),
            ValidationFailure::global(RuleKind::Other("DatesOrdered".into()), "start must precede end"),
        ]));
        let response = dispatch(&exception);

        assert_eq!(response.code(), VALIDATION_FAILED);
        assert_eq!(response.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(response.message(), Some("Validation failed. Error count: 2"));
        assert_eq!(response.field_errors()[0].property, "email");
        assert_eq!(response.field_errors()[0].code, "INVALID_EMAIL");
        assert_eq!(response.global_errors()[0].code, "VALIDATION_FAILED");
    }

    #[test]
    fn test_default_messages_localized() {
        let catalog = CatalogLocalizer::new().with_message(INTERNAL_ERROR, "Something went wrong");
        let response = dispatch_with(&Exception::new(Leaky), &ErrorHandlingOptions::default(), &catalog);
        assert_eq!(response.message(), Some("Something went wrong"));
    }

    #[test]
    fn test_declared_metadata_overrides_kind_row() {
        let metadata = MetadataCache::new();
        metadata.declare::<std::io::Error>(
            crate::metadata::ExceptionMetadata::builder().code("STORAGE_MISSING").build(),
        );
        let options = ErrorHandlingOptions::default();
        let ctx = HandlerContext {
            metadata: &metadata,
            localizer: &NoopLocalizer,
            options: &options,
        };
        let exception = Exception::new(std::io::Error::from(std::io::ErrorKind::NotFound));
        let response = HandlerRegistry::builder().build().dispatch(&exception, &ctx).response;
        assert_eq!(response.code(), "STORAGE_MISSING");
        assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));
    }
}
