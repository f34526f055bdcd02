use super::{ErrorResponse, FieldError, GlobalError, ParameterError};
use crate::config::FieldNames;
use crate::error::{ProblemError, Result};
use crate::handler::defaults::INTERNAL_ERROR;
use axum::http::StatusCode;
use serde_json::{Map, Value};

/// Writes [`ErrorResponse`]s as JSON objects under configurable field names.
///
/// Fixed fields come first in the order code, message, status, fieldErrors,
/// globalErrors, parameterErrors; extension properties follow. An extension
/// property whose key collides with a fixed field name is dropped: fixed
/// fields always win. An empty code is written as `INTERNAL_ERROR`.
#[derive(Debug, Clone, Default)]
pub struct ResponseEncoder {
    names: FieldNames,
}

impl ResponseEncoder {
    pub fn new(names: FieldNames) -> Self {
        Self { names }
    }

    pub fn field_names(&self) -> &FieldNames {
        &self.names
    }

    /// Builds the JSON object without serializing it.
    pub fn to_value(&self, response: &ErrorResponse) -> Result<Value> {
        if let Some((key, message)) = response.property_failures().first() {
            return Err(ProblemError::PropertySerialization {
                key: key.clone(),
                message: message.clone(),
            });
        }

        let names = &self.names;
        let mut object = Map::new();
        let code = if response.code().is_empty() {
            tracing::warn!("Error response has an empty code, writing {}", INTERNAL_ERROR);
            INTERNAL_ERROR
        } else {
            response.code()
        };
        object.insert(names.code.clone(), Value::from(code));
        if let Some(message) = response.message() {
            object.insert(names.message.clone(), Value::from(message));
        }
        if let Some(status) = response.status() {
            object.insert(names.status.clone(), Value::from(status.as_u16()));
        }
        if !response.field_errors().is_empty() {
            let errors = response.field_errors().iter().map(|e| self.field_error(e)).collect();
            object.insert(names.field_errors.clone(), Value::Array(errors));
        }
        if !response.global_errors().is_empty() {
            let errors = response.global_errors().iter().map(|e| self.global_error(e)).collect();
            object.insert(names.global_errors.clone(), Value::Array(errors));
        }
        if !response.parameter_errors().is_empty() {
            let errors = response
                .parameter_errors()
                .iter()
                .map(|e| self.parameter_error(e))
                .collect();
            object.insert(names.parameter_errors.clone(), Value::Array(errors));
        }

        for (key, value) in response.properties() {
            if names.is_reserved(key) {
                tracing::warn!(property = %key, "Dropping extension property that collides with a fixed field");
                continue;
            }
            object.insert(key.clone(), value.clone());
        }

        Ok(Value::Object(object))
    }

    pub fn encode(&self, response: &ErrorResponse) -> Result<Vec<u8>> {
        let value = self.to_value(response)?;
        serde_json::to_vec(&value).map_err(|e| ProblemError::Internal(e.to_string()))
    }

    /// Best-effort inverse of [`encode`](Self::encode).
    ///
    /// Recovers code, message, status and top-level extension properties.
    /// Error collections are not reconstructed.
    pub fn decode(&self, bytes: &[u8]) -> Result<ErrorResponse> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ProblemError::malformed(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(ProblemError::malformed("expected a JSON object"));
        };

        let names = &self.names;
        let code = match object.shift_remove(&names.code) {
            Some(Value::String(code)) => code,
            _ => return Err(ProblemError::malformed(format!("missing string field '{}'", names.code))),
        };
        let mut response = ErrorResponse::new(code);

        if let Some(Value::String(message)) = object.shift_remove(&names.message) {
            response.set_message(Some(message));
        }
        if let Some(status) = object.shift_remove(&names.status).and_then(|s| s.as_u64()) {
            let status = u16::try_from(status)
                .ok()
                .and_then(|s| StatusCode::from_u16(s).ok());
            response.set_status(status);
        }
        for name in [&names.field_errors, &names.global_errors, &names.parameter_errors] {
            object.shift_remove(name);
        }
        for (key, value) in object {
            response.add_property(key, value);
        }
        Ok(response)
    }

    fn field_error(&self, error: &FieldError) -> Value {
        let names = &self.names;
        let mut object = Map::new();
        object.insert(names.code.clone(), Value::from(error.code.as_str()));
        object.insert(names.property.clone(), Value::from(error.property.as_str()));
        object.insert(names.message.clone(), Value::from(error.message.as_str()));
        if let Some(rejected) = &error.rejected_value {
            object.insert(names.rejected_value.clone(), rejected.clone());
        }
        if let Some(path) = &error.path {
            object.insert(names.path.clone(), Value::from(path.as_str()));
        }
        Value::Object(object)
    }

    fn global_error(&self, error: &GlobalError) -> Value {
        let names = &self.names;
        let mut object = Map::new();
        object.insert(names.code.clone(), Value::from(error.code.as_str()));
        object.insert(names.message.clone(), Value::from(error.message.as_str()));
        Value::Object(object)
    }

    fn parameter_error(&self, error: &ParameterError) -> Value {
        let names = &self.names;
        let mut object = Map::new();
        object.insert(names.code.clone(), Value::from(error.code.as_str()));
        object.insert(names.parameter.clone(), Value::from(error.parameter.as_str()));
        object.insert(names.message.clone(), Value::from(error.message.as_str()));
        if let Some(rejected) = &error.rejected_value {
            object.insert(names.rejected_value.clone(), rejected.clone());
        }
        Value::Object(object)
    }
}
