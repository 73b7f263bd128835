//! Shared input format checks.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AppError, AppResult};

static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

// Digits with optional +, spaces, dashes and parentheses; at least 3 digits
static RE_PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[\d\s\-()]*\d[\d\s\-()]*\d[\d\s\-()]*\d[\d\s\-()]*$").unwrap());

static RE_PROTOCOLO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^OUV-\d{8}-[A-Z0-9]{6}$").unwrap());

pub fn is_email(value: &str) -> bool {
    RE_EMAIL.is_match(value.trim())
}

pub fn is_phone(value: &str) -> bool {
    RE_PHONE.is_match(value.trim())
}

pub fn is_protocolo(value: &str) -> bool {
    RE_PROTOCOLO.is_match(value.trim())
}

/// Trimmed value, or an error naming the field.
pub fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::invalid(format!("{} is required", field)))
    } else {
        Ok(value.to_string())
    }
}

/// Trimmed value, `None` when blank.
pub fn optional(value: &str) -> Option<String> {
    Some(value.trim()).filter(|v| !v.is_empty()).map(String::from)
}

pub fn email(field: &str, value: &str) -> AppResult<String> {
    let value = required(field, value)?;
    if !is_email(&value) {
        return Err(AppError::invalid(format!("invalid {}: {}", field, value)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(is_email("ana@chipindo.gov.ao"));
        assert!(!is_email("ana@chipindo"));
        assert!(!is_email("ana chipindo@x.ao"));
        assert!(email("email", " ana@x.ao ").is_ok());
        assert!(email("email", "").is_err());
    }

    #[test]
    fn test_phone() {
        assert!(is_phone("+244 923 000 111"));
        assert!(is_phone("113"));
        assert!(is_phone("(244) 923-000"));
        assert!(!is_phone("12"));
        assert!(!is_phone("abc"));
    }

    #[test]
    fn test_protocolo() {
        assert!(is_protocolo("OUV-20240309-A1B2C3"));
        assert!(!is_protocolo("OUV-2024039-A1B2C3"));
        assert!(!is_protocolo("ouv-20240309-a1b2c3"));
    }

    #[test]
    fn test_required_optional() {
        assert_eq!(required("nome", "  Ana ").unwrap(), "Ana");
        assert!(required("nome", "  ").is_err());
        assert_eq!(optional("  "), None);
        assert_eq!(optional(" x ").as_deref(), Some("x"));
    }
}
