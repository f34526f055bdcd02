//! Message lookup. Resource storage lives with the host; only the lookup
//! contract is defined here.

use std::collections::HashMap;

/// Resolves user-facing messages by error code.
///
/// Returning `None` keeps the caller's default message.
pub trait Localizer: Send + Sync + 'static {
    fn localize(&self, code: &str, default: &str) -> Option<String>;

    fn localize_field_error(&self, code: &str, field: &str, default: &str) -> Option<String> {
        let _ = field;
        self.localize(code, default)
    }
}

/// Always defers to the default message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLocalizer;

impl Localizer for NoopLocalizer {
    fn localize(&self, _code: &str, _default: &str) -> Option<String> {
        None
    }
}

/// In-memory message catalog.
///
/// Field errors look up `"<code>.<field>"` first, then `"<code>"`. The
/// placeholder `{field}` in a template is replaced by the field name.
#[derive(Debug, Clone, Default)]
pub struct CatalogLocalizer {
    messages: HashMap<String, String>,
}

impl CatalogLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.messages.insert(key.into(), template.into());
        self
    }
}

impl Localizer for CatalogLocalizer {
    fn localize(&self, code: &str, _default: &str) -> Option<String> {
        self.messages.get(code).cloned()
    }

    fn localize_field_error(&self, code: &str, field: &str, _default: &str) -> Option<String> {
        self.messages
            .get(&format!("{code}.{field}"))
            .or_else(|| self.messages.get(code))
            .map(|template| template.replace("{field}", field))
    }
}
