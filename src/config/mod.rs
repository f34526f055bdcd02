use crate::error::{ProblemError, Result};
use dashmap::DashMap;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

const PREFIX: &str = "ERROR_HANDLING__";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// Seeded from the process environment.
    pub fn new() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    /// An empty store, for explicit composition and tests.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Parses a value, reporting the key on failure.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ProblemError::config(key, e.to_string())),
        }
    }
}

/// Wire names of every fixed field the encoder writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldNames {
    pub code: String,
    pub message: String,
    pub status: String,
    pub field_errors: String,
    pub global_errors: String,
    pub parameter_errors: String,
    pub property: String,
    pub parameter: String,
    pub rejected_value: String,
    pub path: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            code: "code".into(),
            message: "message".into(),
            status: "status".into(),
            field_errors: "fieldErrors".into(),
            global_errors: "globalErrors".into(),
            parameter_errors: "parameterErrors".into(),
            property: "property".into(),
            parameter: "parameter".into(),
            rejected_value: "rejectedValue".into(),
            path: "path".into(),
        }
    }
}

impl FieldNames {
    /// True when `key` names one of the fixed top-level fields.
    pub fn is_reserved(&self, key: &str) -> bool {
        [
            &self.code,
            &self.message,
            &self.status,
            &self.field_errors,
            &self.global_errors,
            &self.parameter_errors,
        ]
        .iter()
        .any(|name| name.as_str() == key)
    }
}

/// How validation codes are derived when a rule carries no explicit code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum_macros::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ErrorCodeStrategy {
    /// Fixed table: not-empty becomes `REQUIRED_NOT_EMPTY`, and so on.
    #[default]
    Mapped,
    /// The rule's own name in SCREAMING_SNAKE_CASE.
    RuleName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum_macros::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExceptionLogging {
    None,
    #[default]
    MessageOnly,
    /// Message plus the `source()` chain.
    WithCauses,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum_macros::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingOptions {
    pub exception_logging: ExceptionLogging,
    pub server_error_level: LogLevel,
    pub client_error_level: LogLevel,
    /// Exact-status overrides, checked before the class levels.
    pub status_levels: Vec<(u16, LogLevel)>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            exception_logging: ExceptionLogging::MessageOnly,
            server_error_level: LogLevel::Error,
            client_error_level: LogLevel::Debug,
            status_levels: Vec::new(),
        }
    }
}

impl LoggingOptions {
    pub fn level_for(&self, status: u16) -> LogLevel {
        if let Some((_, level)) = self.status_levels.iter().find(|(s, _)| *s == status) {
            return *level;
        }
        if status >= 500 {
            self.server_error_level
        } else {
            self.client_error_level
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitOptions {
    pub code: String,
    pub message: String,
    /// Also send `RateLimit: remaining=0, reset=<seconds>`.
    pub modern_headers: bool,
    pub retry_after_in_body: bool,
    pub retry_after_property: String,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            code: "RATE_LIMIT_EXCEEDED".into(),
            message: "Too many requests".into(),
            modern_headers: false,
            retry_after_in_body: false,
            retry_after_property: "retryAfter".into(),
        }
    }
}

/// All knobs of the error-handling pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ErrorHandlingOptions {
    pub field_names: FieldNames,
    pub error_code_strategy: ErrorCodeStrategy,
    /// Show `Display` of unclassified errors instead of a generic message.
    pub expose_internal_messages: bool,
    pub content_type: String,
    pub logging: LoggingOptions,
    pub rate_limit: RateLimitOptions,
}

impl Default for ErrorHandlingOptions {
    fn default() -> Self {
        Self {
            field_names: FieldNames::default(),
            error_code_strategy: ErrorCodeStrategy::default(),
            expose_internal_messages: false,
            content_type: "application/json".into(),
            logging: LoggingOptions::default(),
            rate_limit: RateLimitOptions::default(),
        }
    }
}

impl ErrorHandlingOptions {
    /// Reads `ERROR_HANDLING__*` keys over the defaults.
    ///
    /// Field names use `ERROR_HANDLING__FIELD_NAMES__<FIELD>` with the field in
    /// SCREAMING_SNAKE_CASE, e.g. `ERROR_HANDLING__FIELD_NAMES__FIELD_ERRORS`.
    pub fn from_config(config: &ConfigService) -> Result<Self> {
        let mut options = Self::default();
        let key = |suffix: &str| format!("{PREFIX}{suffix}");

        {
            let names = &mut options.field_names;
            for (suffix, slot) in [
                ("FIELD_NAMES__CODE", &mut names.code),
                ("FIELD_NAMES__MESSAGE", &mut names.message),
                ("FIELD_NAMES__STATUS", &mut names.status),
                ("FIELD_NAMES__FIELD_ERRORS", &mut names.field_errors),
                ("FIELD_NAMES__GLOBAL_ERRORS", &mut names.global_errors),
                ("FIELD_NAMES__PARAMETER_ERRORS", &mut names.parameter_errors),
                ("FIELD_NAMES__PROPERTY", &mut names.property),
                ("FIELD_NAMES__PARAMETER", &mut names.parameter),
                ("FIELD_NAMES__REJECTED_VALUE", &mut names.rejected_value),
                ("FIELD_NAMES__PATH", &mut names.path),
            ] {
                if let Some(value) = config.get(&key(suffix)) {
                    if value.trim().is_empty() {
                        return Err(ProblemError::config(key(suffix), "field name must not be empty"));
                    }
                    *slot = value;
                }
            }
        }

        if let Some(strategy) = config.get_parsed(&key("ERROR_CODE_STRATEGY"))? {
            options.error_code_strategy = strategy;
        }
        if let Some(expose) = config.get_parsed(&key("EXPOSE_INTERNAL_MESSAGES"))? {
            options.expose_internal_messages = expose;
        }
        if let Some(content_type) = config.get(&key("CONTENT_TYPE")) {
            options.content_type = content_type;
        }
        if let Some(logging) = config.get_parsed(&key("LOGGING__EXCEPTION_LOGGING"))? {
            options.logging.exception_logging = logging;
        }
        if let Some(level) = config.get_parsed(&key("LOGGING__SERVER_ERROR_LEVEL"))? {
            options.logging.server_error_level = level;
        }
        if let Some(level) = config.get_parsed(&key("LOGGING__CLIENT_ERROR_LEVEL"))? {
            options.logging.client_error_level = level;
        }
        if let Some(code) = config.get(&key("RATE_LIMIT__CODE")) {
            options.rate_limit.code = code;
        }
        if let Some(message) = config.get(&key("RATE_LIMIT__MESSAGE")) {
            options.rate_limit.message = message;
        }
        if let Some(modern) = config.get_parsed(&key("RATE_LIMIT__MODERN_HEADERS"))? {
            options.rate_limit.modern_headers = modern;
        }
        if let Some(in_body) = config.get_parsed(&key("RATE_LIMIT__RETRY_AFTER_IN_BODY"))? {
            options.rate_limit.retry_after_in_body = in_body;
        }
        if let Some(property) = config.get(&key("RATE_LIMIT__RETRY_AFTER_PROPERTY")) {
            if property.trim().is_empty() {
                return Err(ProblemError::config(
                    key("RATE_LIMIT__RETRY_AFTER_PROPERTY"),
                    "property name must not be empty",
                ));
            }
            options.rate_limit.retry_after_property = property;
        }
        if let Some(raw) = config.get(&key("LOGGING__STATUS_LEVELS")) {
            options.logging.status_levels = parse_status_levels(&key("LOGGING__STATUS_LEVELS"), &raw)?;
        }

        Ok(options)
    }
}

/// `"404=info, 409=warn"` into exact-status log levels.
fn parse_status_levels(key: &str, raw: &str) -> Result<Vec<(u16, LogLevel)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<(u16, LogLevel)> {
            let (status, level) = entry
                .split_once('=')
                .ok_or_else(|| ProblemError::config(key, format!("expected STATUS=LEVEL, got '{entry}'")))?;
            let status = status
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|s| (100..=599).contains(s))
                .ok_or_else(|| ProblemError::config(key, format!("invalid status in '{entry}'")))?;
            let level = level
                .trim()
                .parse::<LogLevel>()
                .map_err(|e| ProblemError::config(key, e.to_string()))?;
            Ok((status, level))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ErrorHandlingOptions::default();
        assert_eq!(options.field_names.field_errors, "fieldErrors");
        assert_eq!(options.rate_limit.code, "RATE_LIMIT_EXCEEDED");
        assert_eq!(options.error_code_strategy, ErrorCodeStrategy::Mapped);
        assert!(!options.expose_internal_messages);
    }

    #[test]
    fn test_from_config_overrides() {
        let config = ConfigService::empty();
        config.set("ERROR_HANDLING__FIELD_NAMES__CODE", "errorCode");
        config.set("ERROR_HANDLING__ERROR_CODE_STRATEGY", "rule_name");
        config.set("ERROR_HANDLING__RATE_LIMIT__MODERN_HEADERS", "true");
        config.set("ERROR_HANDLING__LOGGING__CLIENT_ERROR_LEVEL", "WARN");

        let options = ErrorHandlingOptions::from_config(&config).unwrap();
        assert_eq!(options.field_names.code, "errorCode");
        assert_eq!(options.error_code_strategy, ErrorCodeStrategy::RuleName);
        assert!(options.rate_limit.modern_headers);
        assert_eq!(options.logging.client_error_level, LogLevel::Warn);
    }

    #[test]
    fn test_from_config_rate_limit_property_and_status_levels() {
        let config = ConfigService::empty();
        config.set("ERROR_HANDLING__RATE_LIMIT__RETRY_AFTER_PROPERTY", "retryAfterSeconds");
        config.set("ERROR_HANDLING__LOGGING__STATUS_LEVELS", "404=info, 409=WARN");

        let options = ErrorHandlingOptions::from_config(&config).unwrap();
        assert_eq!(options.rate_limit.retry_after_property, "retryAfterSeconds");
        assert_eq!(
            options.logging.status_levels,
            vec![(404, LogLevel::Info), (409, LogLevel::Warn)]
        );
        assert_eq!(options.logging.level_for(409), LogLevel::Warn);
    }

    #[test]
    fn test_from_config_rejects_bad_status_levels() {
        let config = ConfigService::empty();
        config.set("ERROR_HANDLING__LOGGING__STATUS_LEVELS", "404:info");
        assert!(matches!(
            ErrorHandlingOptions::from_config(&config),
            Err(ProblemError::Config { .. })
        ));

        let config = ConfigService::empty();
        config.set("ERROR_HANDLING__LOGGING__STATUS_LEVELS", "700=info");
        assert!(ErrorHandlingOptions::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_rejects_bad_values() {
        let config = ConfigService::empty();
        config.set("ERROR_HANDLING__EXPOSE_INTERNAL_MESSAGES", "sometimes");
        let err = ErrorHandlingOptions::from_config(&config).unwrap_err();
        assert!(matches!(err, ProblemError::Config { .. }));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let options: ErrorHandlingOptions = serde_json::from_value(serde_json::json!({
            "fieldNames": { "message": "detail" },
            "rateLimit": { "retryAfterInBody": true }
        }))
        .unwrap();
        assert_eq!(options.field_names.message, "detail");
        assert_eq!(options.field_names.code, "code");
        assert!(options.rate_limit.retry_after_in_body);
    }

    #[test]
    fn test_level_for_status() {
        let mut logging = LoggingOptions::default();
        assert_eq!(logging.level_for(503), LogLevel::Error);
        assert_eq!(logging.level_for(404), LogLevel::Debug);
        logging.status_levels.push((404, LogLevel::Info));
        assert_eq!(logging.level_for(404), LogLevel::Info);
    }
}
