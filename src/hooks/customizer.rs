use crate::response::ErrorResponse;

/// Mutates an assembled response before it is encoded.
///
/// Customizers run in registration order after dispatch. Any
/// `Fn(&mut ErrorResponse)` closure is a customizer.
pub trait ResponseCustomizer: Send + Sync + 'static {
    fn customize(&self, response: &mut ErrorResponse);
}

impl<F> ResponseCustomizer for F
where
    F: Fn(&mut ErrorResponse) + Send + Sync + 'static,
{
    fn customize(&self, response: &mut ErrorResponse) {
        self(response)
    }
}

/// Adds the time the error was rendered as an RFC 3339 property.
#[derive(Debug, Clone)]
pub struct TimestampCustomizer {
    property: String,
}

impl TimestampCustomizer {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }
}

impl Default for TimestampCustomizer {
    fn default() -> Self {
        Self::new("timestamp")
    }
}

impl ResponseCustomizer for TimestampCustomizer {
    fn customize(&self, response: &mut ErrorResponse) {
        response.add_property(self.property.clone(), chrono::Utc::now().to_rfc3339());
    }
}
