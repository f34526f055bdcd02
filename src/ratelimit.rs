//! Formats rate-limiter rejections with the same wire format as every other error.

use crate::error::{ProblemError, Result};
use crate::pipeline::ErrorPipeline;
use crate::response::ErrorResponse;
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode, header};
use std::time::Duration;
use tokio::sync::watch;

/// The `RateLimit` header of the IETF rate-limit header draft.
pub static RATE_LIMIT: HeaderName = HeaderName::from_static("ratelimit");

/// What the rate limiter reports about a rejected lease.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseMetadata {
    pub retry_after: Option<Duration>,
}

impl LeaseMetadata {
    pub fn retry_after(duration: Duration) -> Self {
        Self {
            retry_after: Some(duration),
        }
    }
}

/// Whole seconds to wait, rounded up and never zero.
pub fn retry_after_seconds(retry_after: Duration) -> u64 {
    let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    seconds.max(1)
}

/// Accepts a finished response.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, status: StatusCode, headers: HeaderMap, body: Bytes) -> Result<()>;
}

/// Caller-supplied cancellation for the final write.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    receiver: watch::Receiver<bool>,
}

impl CancellationSignal {
    /// A signal plus the sender that fires it.
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (sender, receiver) = watch::channel(false);
        (sender, Self { receiver })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::new().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    async fn cancelled(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender dropped without cancelling: never resolves.
            std::future::pending::<()>().await;
        }
    }
}

/// Everything the adapter needs from the request being rejected.
pub struct RequestContext<'a> {
    pub transport: &'a mut dyn Transport,
    pub cancellation: CancellationSignal,
}

/// Builds `429 Too Many Requests` responses from lease metadata.
#[derive(Clone)]
pub struct RateLimitResponder {
    pipeline: ErrorPipeline,
}

impl RateLimitResponder {
    pub fn new(pipeline: ErrorPipeline) -> Self {
        Self { pipeline }
    }

    /// The structured body plus the retry headers.
    pub fn error_response(&self, lease: &LeaseMetadata) -> (ErrorResponse, HeaderMap) {
        let options = &self.pipeline.options().rate_limit;
        let message = self
            .pipeline
            .localizer()
            .localize(&options.code, &options.message)
            .unwrap_or_else(|| options.message.clone());

        let mut response = ErrorResponse::new(options.code.clone())
            .with_status(StatusCode::TOO_MANY_REQUESTS)
            .with_message(message);
        let mut headers = HeaderMap::new();

        if let Some(retry_after) = lease.retry_after {
            let seconds = retry_after_seconds(retry_after);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(seconds));
            if options.modern_headers {
                let summary = format!("remaining=0, reset={seconds}");
                if let Ok(value) = HeaderValue::from_str(&summary) {
                    headers.insert(RATE_LIMIT.clone(), value);
                }
            }
            if options.retry_after_in_body {
                response.add_property(options.retry_after_property.clone(), seconds);
            }
        }

        self.pipeline.customize(&mut response);
        (response, headers)
    }

    /// Renders the rejection as an axum response.
    pub fn response(&self, lease: &LeaseMetadata) -> Response<Body> {
        let (error, headers) = self.error_response(lease);
        match self.pipeline.encode(&error) {
            Ok((status, body)) => self.pipeline.http_response(status, headers, body),
            Err(err) => {
                tracing::error!("Failed to encode rate-limit response: {}", err);
                self.pipeline.render_response(&error)
            }
        }
    }

    /// Writes the rejection to the request's transport, honoring cancellation.
    pub async fn write(&self, ctx: &mut RequestContext<'_>, lease: &LeaseMetadata) -> Result<()> {
        let (error, mut headers) = self.error_response(lease);
        let (status, body) = self.pipeline.encode(&error)?;
        let content_type = HeaderValue::from_str(&self.pipeline.options().content_type)
            .map_err(|e| ProblemError::config("content_type", e.to_string()))?;
        headers.insert(header::CONTENT_TYPE, content_type);

        if ctx.cancellation.is_cancelled() {
            return Err(ProblemError::Cancelled);
        }
        tracing::debug!(status = status.as_u16(), "Writing rate-limit rejection");

        let mut cancellation = ctx.cancellation.clone();
        tokio::select! {
            result = ctx.transport.send(status, headers, body) => result,
            _ = cancellation.cancelled() => Err(ProblemError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ErrorHandlingOptions, RateLimitOptions};
    use crate::localization::CatalogLocalizer;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Option<(StatusCode, HeaderMap, Bytes)>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&mut self, status: StatusCode, headers: HeaderMap, body: Bytes) -> Result<()> {
            self.sent = Some((status, headers, body));
            Ok(())
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl Transport for StalledTransport {
        async fn send(&mut self, _: StatusCode, _: HeaderMap, _: Bytes) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn responder(rate_limit: RateLimitOptions) -> RateLimitResponder {
        let options = ErrorHandlingOptions {
            rate_limit,
            ..ErrorHandlingOptions::default()
        };
        RateLimitResponder::new(ErrorPipeline::builder().options(options).build())
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_seconds(Duration::from_millis(400)), 1);
        assert_eq!(retry_after_seconds(Duration::from_secs(30)), 30);
        assert_eq!(retry_after_seconds(Duration::from_millis(30_001)), 31);
        assert_eq!(retry_after_seconds(Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn test_write_rejection_with_retry_after() {
        let responder = responder(RateLimitOptions::default());
        let mut transport = RecordingTransport::default();
        let mut ctx = RequestContext {
            transport: &mut transport,
            cancellation: CancellationSignal::never(),
        };

        responder
            .write(&mut ctx, &LeaseMetadata::retry_after(Duration::from_secs(30)))
            .await
            .unwrap();

        let (status, headers, body) = transport.sent.unwrap();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "30");
        assert!(headers.get(&RATE_LIMIT).is_none());
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["status"], 429);
        assert!(body.get("retryAfter").is_none());
    }

    #[test]
    fn test_modern_headers_and_body_property() {
        let responder = responder(RateLimitOptions {
            modern_headers: true,
            retry_after_in_body: true,
            ..RateLimitOptions::default()
        });
        let (error, headers) = responder.error_response(&LeaseMetadata::retry_after(Duration::from_millis(2500)));

        assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "3");
        assert_eq!(headers.get(&RATE_LIMIT).unwrap(), "remaining=0, reset=3");
        assert_eq!(error.property("retryAfter"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_no_retry_metadata_no_headers() {
        let responder = responder(RateLimitOptions::default());
        let (error, headers) = responder.error_response(&LeaseMetadata::default());
        assert!(headers.is_empty());
        assert_eq!(error.message(), Some("Too many requests"));
    }

    #[test]
    fn test_message_localized() {
        let pipeline = ErrorPipeline::builder()
            .localizer(CatalogLocalizer::new().with_message("RATE_LIMIT_EXCEEDED", "Slow down"))
            .build();
        let (error, _) = RateLimitResponder::new(pipeline).error_response(&LeaseMetadata::default());
        assert_eq!(error.message(), Some("Slow down"));
    }

    #[tokio::test]
    async fn test_axum_response() {
        let response = responder(RateLimitOptions::default())
            .response(&LeaseMetadata::retry_after(Duration::from_secs(5)));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "5");
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_stalled_write() {
        let responder = responder(RateLimitOptions::default());
        let (cancel, signal) = CancellationSignal::new();
        let mut transport = StalledTransport;
        let mut ctx = RequestContext {
            transport: &mut transport,
            cancellation: signal,
        };

        let lease = LeaseMetadata::default();
        let write = responder.write(&mut ctx, &lease);
        let trigger = async {
            tokio::task::yield_now().await;
            let _ = cancel.send(true);
        };
        let (result, ()) = tokio::join!(write, trigger);
        assert!(matches!(result, Err(ProblemError::Cancelled)));
    }
}
