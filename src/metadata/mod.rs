//! Static error metadata: stable code, HTTP status and payload properties.
//!
//! Metadata is declared at compile time with `#[derive(ErrorMetadata)]` or
//! registered at startup through [`MetadataCache::declare`]. It is a pure
//! function of the error type, so the cache never needs invalidation.

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

mod cache;

pub use cache::MetadataCache;

/// How one field of an error becomes a top-level response property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMapping {
    /// Name the error's property reader answers to.
    pub source: &'static str,
    /// Key written into the response.
    pub output_name: String,
    /// Emit JSON `null` instead of dropping the property when it has no value.
    pub include_if_null: bool,
}

impl PropertyMapping {
    /// Maps a field under its lower-camel-cased name.
    pub fn field(source: &'static str) -> Self {
        Self {
            source,
            output_name: crate::naming::field_to_camel_case(source),
            include_if_null: false,
        }
    }

    /// Maps a field under an explicit output name.
    pub fn named(source: &'static str, output_name: impl Into<String>) -> Self {
        Self {
            source,
            output_name: output_name.into(),
            include_if_null: false,
        }
    }

    pub fn include_if_null(mut self, include: bool) -> Self {
        self.include_if_null = include;
        self
    }
}

/// Derived, immutable description of an error type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionMetadata {
    pub error_code: Option<String>,
    pub status: Option<StatusCode>,
    pub properties: Vec<PropertyMapping>,
}

impl ExceptionMetadata {
    pub fn builder() -> ExceptionMetadataBuilder {
        ExceptionMetadataBuilder::default()
    }

    /// True when nothing was declared for the type.
    pub fn is_empty(&self) -> bool {
        self.error_code.is_none() && self.status.is_none() && self.properties.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ExceptionMetadataBuilder {
    metadata: ExceptionMetadata,
}

impl ExceptionMetadataBuilder {
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.metadata.error_code = Some(code.into());
        self
    }

    /// Accepts a `StatusCode` or a raw `u16`; both normalize to `StatusCode`.
    /// Raw values outside 100..=599 are ignored.
    pub fn status(mut self, status: impl Into<StatusValue>) -> Self {
        self.metadata.status = status.into().0;
        self
    }

    pub fn property(mut self, mapping: PropertyMapping) -> Self {
        self.metadata.properties.push(mapping);
        self
    }

    pub fn build(self) -> ExceptionMetadata {
        self.metadata
    }
}

/// Either form a status may be declared in.
pub struct StatusValue(Option<StatusCode>);

impl From<StatusCode> for StatusValue {
    fn from(status: StatusCode) -> Self {
        Self(Some(status))
    }
}

impl From<u16> for StatusValue {
    fn from(raw: u16) -> Self {
        if !(100..=599).contains(&raw) {
            return Self(None);
        }
        Self(StatusCode::from_u16(raw).ok())
    }
}

/// Implemented by `#[derive(ErrorMetadata)]`.
///
/// # Example
/// ```
/// use problemkit::ErrorMetadata;
///
/// #[derive(Debug, thiserror::Error, ErrorMetadata)]
/// #[error("User with ID '{user_id}' was not found")]
/// #[error_meta(code = "USER_NOT_FOUND", status = 404)]
/// pub struct UserNotFound {
///     #[error_property]
///     user_id: String,
/// }
/// ```
pub trait ErrorMetadata: std::error::Error + Send + Sync + 'static {
    fn metadata() -> ExceptionMetadata
    where
        Self: Sized;

    /// Reads the value behind a [`PropertyMapping::source`].
    fn property_value(&self, source: &str) -> Option<serde_json::Result<Value>>;
}

/// Serializes a field for [`ErrorMetadata::property_value`].
pub fn to_property_value<T: Serialize + ?Sized>(value: &T) -> Option<serde_json::Result<Value>> {
    Some(serde_json::to_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_declarations() {
        let metadata = ExceptionMetadata::builder()
            .code("ORDER_LOCKED")
            .status(423u16)
            .property(PropertyMapping::field("order_id"))
            .property(PropertyMapping::named("reason", "lockReason").include_if_null(true))
            .build();

        assert_eq!(metadata.error_code.as_deref(), Some("ORDER_LOCKED"));
        assert_eq!(metadata.status, Some(StatusCode::LOCKED));
        assert_eq!(metadata.properties[0].output_name, "orderId");
        assert_eq!(metadata.properties[1].output_name, "lockReason");
        assert!(metadata.properties[1].include_if_null);
    }

    #[test]
    fn test_status_enumerant_and_integer_normalize_equal() {
        let from_int = ExceptionMetadata::builder().status(404u16).build();
        let from_enum = ExceptionMetadata::builder().status(StatusCode::NOT_FOUND).build();
        assert_eq!(from_int, from_enum);
    }

    #[test]
    fn test_out_of_range_status_ignored() {
        let metadata = ExceptionMetadata::builder().status(42u16).build();
        assert!(metadata.status.is_none());
        assert!(metadata.is_empty());
    }
}
