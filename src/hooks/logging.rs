use crate::config::{ExceptionLogging, LogLevel, LoggingOptions};
use crate::exception::Exception;
use crate::handler::HandlerFailure;
use crate::response::ErrorResponse;
use std::sync::Arc;

/// Decides whether one error gets logged. Must not mutate anything.
pub trait LoggingFilter: Send + Sync + 'static {
    fn should_log(&self, response: &ErrorResponse, exception: &Exception) -> bool;
}

impl<F> LoggingFilter for F
where
    F: Fn(&ErrorResponse, &Exception) -> bool + Send + Sync + 'static,
{
    fn should_log(&self, response: &ErrorResponse, exception: &Exception) -> bool {
        self(response, exception)
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::trace!($($arg)+),
            LogLevel::Debug => tracing::debug!($($arg)+),
            LogLevel::Info => tracing::info!($($arg)+),
            LogLevel::Warn => tracing::warn!($($arg)+),
            LogLevel::Error => tracing::error!($($arg)+),
        }
    };
}

/// Writes handled errors to `tracing`.
///
/// Every filter must agree: the first filter returning `false` suppresses the
/// entry and the remaining filters are not consulted.
#[derive(Clone, Default)]
pub struct ErrorLogger {
    options: LoggingOptions,
    filters: Vec<Arc<dyn LoggingFilter>>,
}

impl ErrorLogger {
    pub fn new(options: LoggingOptions, filters: Vec<Arc<dyn LoggingFilter>>) -> Self {
        Self { options, filters }
    }

    pub fn should_log(&self, response: &ErrorResponse, exception: &Exception) -> bool {
        if self.options.exception_logging == ExceptionLogging::None {
            return false;
        }
        self.filters.iter().all(|filter| filter.should_log(response, exception))
    }

    /// Logs the error if allowed; returns whether an entry was written.
    pub fn log(&self, response: &ErrorResponse, exception: &Exception) -> bool {
        if !self.should_log(response, exception) {
            return false;
        }
        let status = response.effective_status().as_u16();
        let level = self.options.level_for(status);
        let code = response.code();
        let error_type = exception.type_name();

        match self.options.exception_logging {
            ExceptionLogging::None => return false,
            ExceptionLogging::MessageOnly => {
                log_at!(level, status, code, error_type, "{}", exception);
            }
            ExceptionLogging::WithCauses => {
                let causes = cause_chain(exception);
                log_at!(level, status, code, error_type, causes = %causes, "{}", exception);
            }
        }
        true
    }

    /// A producer failed. Always logged, filters do not apply.
    pub fn log_handler_failure(&self, failure: &HandlerFailure) {
        tracing::error!(
            handler = %failure.handler,
            error_type = failure.exception_type,
            "Exception handler failed, answered with the generic fallback: {}",
            failure.message
        );
    }
}

fn cause_chain(exception: &Exception) -> String {
    let mut parts = Vec::new();
    let mut source = exception.error().source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    for (i, inner) in exception.causes().iter().enumerate() {
        parts.push(format!("[{i}] {inner}"));
    }
    parts.join(" <- ")
}
