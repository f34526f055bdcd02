use proc_macro::TokenStream;

mod error_metadata;

/// Derive macro declaring the code, status and payload properties of an error type
///
/// # Example
/// ```ignore
/// use problemkit::ErrorMetadata;
///
/// #[derive(Debug, thiserror::Error, ErrorMetadata)]
/// #[error("Order {order_id} is locked")]
/// #[error_meta(code = "ORDER_LOCKED", status = LOCKED)]
/// pub struct OrderLocked {
///     #[error_property]
///     order_id: u64,
///     #[error_property(name = "lockedBy", include_if_null)]
///     owner: Option<String>,
/// }
/// ```
///
/// `status` takes an integer (`404`), a `StatusCode` constant name
/// (`NOT_FOUND`) or any expression evaluating to a `StatusCode`.
#[proc_macro_derive(ErrorMetadata, attributes(error_meta, error_property))]
pub fn derive_error_metadata(input: TokenStream) -> TokenStream {
    error_metadata::derive_error_metadata(input)
}
