//! Property-name normalization for the wire format.

/// Lower-camel-cases a dotted property path, one segment at a time.
///
/// Each segment only gets its first character lowercased; the rest, underscores
/// included, is left as reported.
///
/// ```
/// use problemkit::naming::to_camel_case;
///
/// assert_eq!(to_camel_case("Address.ZipCode"), "address.zipCode");
/// assert_eq!(to_camel_case("address.zip_code"), "address.zip_code");
/// ```
pub fn to_camel_case(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    path.split('.').map(lower_first).collect::<Vec<_>>().join(".")
}

/// Output name for a Rust field: `order_id` becomes `orderId`.
pub fn field_to_camel_case(field: &str) -> String {
    snake_to_camel(field)
}

fn lower_first(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn snake_to_camel(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for (i, word) in segment.split('_').filter(|w| !w.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(&lower_first(word));
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// Converts a PascalCase or camelCase identifier into SCREAMING_SNAKE_CASE.
pub fn to_screaming_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch == '_' || ch == '-' || ch == ' ' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        out.extend(ch.to_uppercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pascal_case_single_segment() {
        assert_eq!(to_camel_case("UserName"), "userName");
    }

    #[test]
    fn test_dotted_path() {
        assert_eq!(to_camel_case("Address.ZipCode"), "address.zipCode");
        assert_eq!(to_camel_case("Items[0].Name"), "items[0].name");
    }

    #[test]
    fn test_empty_and_single_char() {
        assert_eq!(to_camel_case(""), "");
        assert_eq!(to_camel_case("X"), "x");
    }

    #[test]
    fn test_snake_case_paths_kept() {
        assert_eq!(to_camel_case("first_name"), "first_name");
        assert_eq!(to_camel_case("Billing_address.Zip_code"), "billing_address.zip_code");
        assert_eq!(to_camel_case("userId"), "userId");
    }

    #[test]
    fn test_field_names_joined() {
        assert_eq!(field_to_camel_case("user_id"), "userId");
        assert_eq!(field_to_camel_case("owner"), "owner");
        assert_eq!(field_to_camel_case("retry_after_secs"), "retryAfterSecs");
    }

    #[test]
    fn test_screaming_snake() {
        assert_eq!(to_screaming_snake_case("NotEmpty"), "NOT_EMPTY");
        assert_eq!(to_screaming_snake_case("GreaterThanOrEqual"), "GREATER_THAN_OR_EQUAL");
        assert_eq!(to_screaming_snake_case("credit_card"), "CREDIT_CARD");
    }
}
