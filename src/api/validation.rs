//! Input validation for API requests.
//!
//! For collecting multiple validation errors and returning them as an
//! ApiError, use the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Deliberately loose email shape check; deliverability is proven by the
    /// OTP round trip, not the regex
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();

    /// Phone numbers: optional +, then digits, spaces or dashes
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9][0-9 \-]{5,19}$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Validate a password for signup and resets
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }
    Ok(())
}

/// Validate a phone number, when present
pub fn validate_phone_number(phone: &str) -> Result<(), String> {
    if !PHONE_REGEX.is_match(phone) {
        return Err("Invalid phone number format".to_string());
    }
    Ok(())
}

/// Validate a latitude value
pub fn validate_latitude(value: f64) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&value) {
        return Err("Latitude must be between -90 and 90".to_string());
    }
    Ok(())
}

/// Validate a longitude value
pub fn validate_longitude(value: f64) -> Result<(), String> {
    if !(-180.0..=180.0).contains(&value) {
        return Err("Longitude must be between -180 and 180".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("anna@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("two@@example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_phone_number() {
        assert!(validate_phone_number("+1 555-0142").is_ok());
        assert!(validate_phone_number("01712345678").is_ok());
        assert!(validate_phone_number("abc").is_err());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_latitude(23.81).is_ok());
        assert!(validate_latitude(91.0).is_err());
        assert!(validate_longitude(90.41).is_ok());
        assert!(validate_longitude(-181.0).is_err());
    }
}
