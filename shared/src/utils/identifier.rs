//! Identifier utilities for email addresses and phone numbers

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

// Local numbers ("555-1234") and E.164 both reduce to 7..15 digits
static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?[0-9]{7,15}$").expect("phone pattern is valid")
});

/// Whether the identifier has the shape of an email address
///
/// This is a shape test only: anything containing `@` counts.
pub fn is_email_shaped(identifier: &str) -> bool {
    identifier.contains('@')
}

/// Normalize a phone number by removing common formatting characters
pub fn normalize_phone_number(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Check if an email address is syntactically valid
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email.trim())
}

/// Check if a phone number is valid once formatting is stripped
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(&normalize_phone_number(phone))
}

/// Mask an identifier for logs
///
/// Emails keep the first character of the local part and the domain
/// (`a***@x.com`); phones keep the first three and last four digits
/// (`555****1234`).
pub fn mask_identifier(identifier: &str) -> String {
    if let Some((local, domain)) = identifier.split_once('@') {
        let first = local.chars().next().map(String::from).unwrap_or_default();
        return format!("{}***@{}", first, domain);
    }

    let normalized = normalize_phone_number(identifier);
    if normalized.len() >= 7 {
        format!(
            "{}****{}",
            &normalized[0..3],
            &normalized[normalized.len() - 4..]
        )
    } else {
        "****".to_string()
    }
}
