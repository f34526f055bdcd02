//! # Problemkit
//!
//! Structured JSON error responses for axum services.
//!
//! Problemkit maps errors raised while serving a request into one stable wire
//! shape: a machine-readable `code`, an optional `message`, the HTTP `status`,
//! field/global/parameter validation errors and free-form extension
//! properties.
//!
//! ## Features
//!
//! - **Error metadata**: `#[derive(ErrorMetadata)]` declares code, status and payload fields per error type
//! - **Ordered handlers**: priority-ordered handler registry with a built-in default chain
//! - **Validation aggregation**: field, global and parameter errors with stable codes
//! - **Configurable wire names**: every fixed JSON field can be renamed
//! - **Hooks**: response customizers, logging filters and a localization interface
//! - **Rate limiting**: `429` responses with `Retry-After` in the same format
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use problemkit::{ErrorHandlingLayer, ErrorMetadata, ErrorPipeline, Raised};
//! use axum::{Router, routing::get, extract::Path};
//!
//! #[derive(Debug, thiserror::Error, ErrorMetadata)]
//! #[error("User with ID '{user_id}' was not found")]
//! #[error_meta(code = "USER_NOT_FOUND", status = NOT_FOUND)]
//! pub struct UserNotFound {
//!     #[error_property]
//!     user_id: String,
//! }
//!
//! async fn get_user(Path(id): Path<String>) -> Result<String, Raised> {
//!     Err(UserNotFound { user_id: id })?
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = ErrorPipeline::builder().build();
//!
//!     let app: Router = Router::new()
//!         .route("/users/{id}", get(get_user))
//!         .layer(ErrorHandlingLayer::new(pipeline));
//!
//!     // Serve your app...
//! }
//! ```

// Lets the derive's `::problemkit::` paths resolve inside this crate's own tests.
extern crate self as problemkit;

pub mod config;
pub mod error;
pub mod exception;
pub mod handler;
pub mod hooks;
pub mod layer;
pub mod localization;
pub mod metadata;
pub mod naming;
pub mod pipeline;
pub mod ratelimit;
pub mod response;
pub mod validation;

// Re-export core types
pub use config::{ConfigService, ErrorHandlingOptions, FieldNames};
pub use error::{ProblemError, Result};
pub use exception::{Exception, ExceptionKind};
pub use handler::{ExceptionHandler, HandlerContext, HandlerRegistry};
pub use layer::{ErrorHandlingLayer, Raised};
pub use metadata::{ErrorMetadata, ExceptionMetadata, MetadataCache, PropertyMapping};
pub use pipeline::ErrorPipeline;
pub use ratelimit::{LeaseMetadata, RateLimitResponder};
pub use response::{ErrorResponse, FieldError, GlobalError, ParameterError, ResponseEncoder};
pub use validation::{RuleKind, ValidationException, ValidationFailure};

// Re-export macros
pub use problemkit_macro::ErrorMetadata;

// Re-export dependencies used by generated code
pub use axum;
pub use serde_json;

/// Prelude module for convenient imports
///
/// ```
/// use problemkit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ErrorCodeStrategy, ErrorHandlingOptions, FieldNames};
    pub use crate::exception::{Exception, ExceptionKind};
    pub use crate::handler::{ExceptionHandler, FnHandler, HandlerContext};
    pub use crate::hooks::{LoggingFilter, ResponseCustomizer, TimestampCustomizer};
    pub use crate::layer::{ErrorHandlingLayer, Raised};
    pub use crate::localization::{CatalogLocalizer, Localizer};
    pub use crate::metadata::{ErrorMetadata, ExceptionMetadata, PropertyMapping};
    pub use crate::pipeline::ErrorPipeline;
    pub use crate::ratelimit::{LeaseMetadata, RateLimitResponder};
    pub use crate::response::{ErrorResponse, FieldError, GlobalError, ParameterError};
    pub use crate::validation::{RuleKind, ValidationException, ValidationFailure};
    pub use axum::http::StatusCode;
}
