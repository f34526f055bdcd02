//! Tower middleware that renders raised exceptions through an [`ErrorPipeline`].

use crate::exception::{BoxError, Exception};
use crate::metadata::ErrorMetadata;
use crate::pipeline::ErrorPipeline;
use crate::validation::ValidationException;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Handler-side error type.
///
/// Returning `Err(Raised)` from an axum handler parks the exception in the
/// response extensions; [`ErrorHandlingLayer`] picks it up and renders it.
/// Without the layer installed the client sees an empty 500.
///
/// # Example
/// ```
/// use problemkit::{ErrorMetadata, Raised};
///
/// #[derive(Debug, thiserror::Error, ErrorMetadata)]
/// #[error("User with ID '{user_id}' was not found")]
/// #[error_meta(code = "USER_NOT_FOUND", status = 404)]
/// struct UserNotFound {
///     #[error_property]
///     user_id: String,
/// }
///
/// async fn get_user(id: String) -> Result<String, Raised> {
///     Err(UserNotFound { user_id: id })?
/// }
/// ```
#[derive(Debug)]
pub struct Raised(pub Exception);

impl From<Exception> for Raised {
    fn from(exception: Exception) -> Self {
        Self(exception)
    }
}

impl<E: ErrorMetadata> From<E> for Raised {
    fn from(error: E) -> Self {
        Self(Exception::described(error))
    }
}

impl From<ValidationException> for Raised {
    fn from(error: ValidationException) -> Self {
        Self(Exception::new(error))
    }
}

/// Response extension carrying the exception to the middleware.
#[derive(Clone)]
struct RaisedException(Arc<Exception>);

impl IntoResponse for Raised {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(RaisedException(Arc::new(self.0)));
        response
    }
}

/// Tower Layer for error rendering
#[derive(Clone)]
pub struct ErrorHandlingLayer {
    pipeline: ErrorPipeline,
}

impl ErrorHandlingLayer {
    pub fn new(pipeline: ErrorPipeline) -> Self {
        Self { pipeline }
    }
}

impl<S> Layer<S> for ErrorHandlingLayer {
    type Service = ErrorHandlingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorHandlingMiddleware {
            inner,
            pipeline: self.pipeline.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ErrorHandlingMiddleware<S> {
    inner: S,
    pipeline: ErrorPipeline,
}

impl<S> Service<Request<Body>> for ErrorHandlingMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError> + Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness errors surface again from `call`, where they get rendered.
        match self.inner.poll_ready(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(_) => Poll::Ready(Ok(())),
        }
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let pipeline = self.pipeline.clone();
        // Keep the instance that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match inner.call(request).await {
                Ok(mut response) => match response.extensions_mut().remove::<RaisedException>() {
                    Some(RaisedException(exception)) => Ok(pipeline.render(&exception)),
                    None => Ok(response),
                },
                Err(err) => Ok(pipeline.render(&Exception::from_boxed(err.into()))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{RuleKind, ValidationFailure};
    use axum::Router;
    use axum::routing::get;
    use tower::ServiceExt;

    #[derive(Debug, thiserror::Error, crate::ErrorMetadata)]
    #[error("User with ID '{user_id}' was not found")]
    #[error_meta(code = "USER_NOT_FOUND", status = 404)]
    struct UserNotFound {
        #[error_property]
        user_id: String,
    }

    async fn get_user(axum::extract::Path(id): axum::extract::Path<String>) -> Result<String, Raised> {
        if id == "admin" {
            return Ok("admin".into());
        }
        Err(UserNotFound { user_id: id })?
    }

    async fn create_user() -> Result<String, Raised> {
        Err(ValidationException::new(vec![ValidationFailure::property(
            "UserName",
            RuleKind::NotEmpty,
            "must not be empty",
        )]))?
    }

    fn app() -> Router {
        Router::new()
            .route("/users/{id}", get(get_user))
            .route("/users", get(create_user))
            .layer(ErrorHandlingLayer::new(ErrorPipeline::builder().build()))
    }

    async fn call(uri: &str) -> (StatusCode, String) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_raised_exception_rendered() {
        let (status, body) = call("/users/user-1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            r#"{"code":"USER_NOT_FOUND","message":"User with ID 'user-1' was not found","status":404,"userId":"user-1"}"#
        );
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let (status, body) = call("/users/admin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[tokio::test]
    async fn test_validation_rendered() {
        let (status, body) = call("/users").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            concat!(
                r#"{"code":"VALIDATION_FAILED","message":"Validation failed. Error count: 1","status":400,"#,
                r#""fieldErrors":[{"code":"REQUIRED_NOT_EMPTY","property":"userName","message":"must not be empty"}]}"#
            )
        );
    }

    #[tokio::test]
    async fn test_inner_service_error_rendered() {
        let failing = tower::service_fn(|_: Request<Body>| async {
            Err::<Response, BoxError>(Box::new(std::io::Error::from(std::io::ErrorKind::TimedOut)))
        });
        let service = ErrorHandlingLayer::new(ErrorPipeline::builder().build()).layer(failing);

        let response = service
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
