//! Post-dispatch hooks: response customizers and logging filters.

mod customizer;
mod logging;

pub use customizer::{ResponseCustomizer, TimestampCustomizer};
pub use logging::{ErrorLogger, LoggingFilter};
