//! The in-memory error result handed from handlers to the encoder.

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

mod encoder;

pub use encoder::ResponseEncoder;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub code: String,
    pub property: String,
    pub message: String,
    /// `Some(Value::Null)` is emitted as `null`; `None` is omitted.
    pub rejected_value: Option<Value>,
    pub path: Option<String>,
}

impl FieldError {
    pub fn new(
        code: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            property: property.into(),
            message: message.into(),
            rejected_value: None,
            path: None,
        }
    }

    pub fn with_rejected_value(mut self, value: Value) -> Self {
        self.rejected_value = Some(value);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalError {
    pub code: String,
    pub message: String,
}

impl GlobalError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterError {
    pub code: String,
    pub parameter: String,
    pub message: String,
    pub rejected_value: Option<Value>,
}

impl ParameterError {
    pub fn new(
        code: impl Into<String>,
        parameter: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            parameter: parameter.into(),
            message: message.into(),
            rejected_value: None,
        }
    }

    pub fn with_rejected_value(mut self, value: Value) -> Self {
        self.rejected_value = Some(value);
        self
    }
}

/// Structured error result.
///
/// Extension properties keep insertion order. Re-adding an existing key
/// replaces its value in place: the key keeps its original position.
///
/// # Example
/// ```
/// use problemkit::response::ErrorResponse;
/// use axum::http::StatusCode;
///
/// let mut response = ErrorResponse::new("USER_NOT_FOUND")
///     .with_status(StatusCode::NOT_FOUND)
///     .with_message("User with ID 'user-1' was not found");
/// response.add_property("userId", "user-1");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorResponse {
    status: Option<StatusCode>,
    code: String,
    message: Option<String>,
    field_errors: Vec<FieldError>,
    global_errors: Vec<GlobalError>,
    parameter_errors: Vec<ParameterError>,
    properties: Map<String, Value>,
    property_failures: Vec<(String, String)>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// `None` means unset; the transport then answers 500.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: Option<StatusCode>) {
        self.status = status;
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_message(&mut self, message: Option<String>) {
        self.message = message;
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    pub fn global_errors(&self) -> &[GlobalError] {
        &self.global_errors
    }

    pub fn parameter_errors(&self) -> &[ParameterError] {
        &self.parameter_errors
    }

    pub fn add_field_error(&mut self, error: FieldError) {
        self.field_errors.push(error);
    }

    pub fn add_global_error(&mut self, error: GlobalError) {
        self.global_errors.push(error);
    }

    pub fn add_parameter_error(&mut self, error: ParameterError) {
        self.parameter_errors.push(error);
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Adds an extension property.
    ///
    /// A value that fails to serialize is not replaced by a guess; the
    /// failure is kept and reported when the response is encoded.
    pub fn add_property<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> &mut Self {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.property_failures.retain(|(k, _)| k != &key);
                self.properties.insert(key, value);
            }
            Err(err) => {
                self.properties.shift_remove(&key);
                self.property_failures.push((key, err.to_string()));
            }
        }
        self
    }

    /// Adds an already-serialized property, or records its serialization failure.
    pub fn add_property_result(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Result<Value>,
    ) -> &mut Self {
        let key = key.into();
        match value {
            Ok(value) => self.add_property(key, value),
            Err(err) => {
                self.properties.shift_remove(&key);
                self.property_failures.push((key, err.to_string()));
                self
            }
        }
    }

    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.shift_remove(key)
    }

    pub(crate) fn property_failures(&self) -> &[(String, String)] {
        &self.property_failures
    }

    /// Status the transport writes: the explicit status, or 500 when unset.
    pub fn effective_status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("not representable"))
        }
    }

    #[test]
    fn test_overwrite_keeps_original_position() {
        let mut response = ErrorResponse::new("CONFLICT");
        response.add_property("first", 1);
        response.add_property("second", 2);
        response.add_property("first", 3);

        let keys: Vec<_> = response.properties().keys().cloned().collect();
        assert_eq!(keys, vec!["first", "second"]);
        assert_eq!(response.property("first"), Some(&Value::from(3)));
    }

    #[test]
    fn test_unserializable_property_is_recorded() {
        let mut response = ErrorResponse::new("BROKEN");
        response.add_property("bad", Unserializable);
        assert!(response.property("bad").is_none());
        assert_eq!(response.property_failures().len(), 1);

        response.add_property("bad", "fixed");
        assert!(response.property_failures().is_empty());
    }

    #[test]
    fn test_effective_status_defaults_to_500() {
        let response = ErrorResponse::new("X");
        assert_eq!(response.status(), None);
        assert_eq!(response.effective_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
