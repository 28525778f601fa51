// Validation utilities module
// Provides custom validation functions for domain-specific rules

use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

/// Validates that a service tier is one of the accepted values
/// Valid values: "basic", "premium", "deluxe" (case-insensitive)
pub fn validate_tier(tier: &str) -> Result<(), ValidationError> {
    let valid_tiers = ["basic", "premium", "deluxe"];
    if valid_tiers.contains(&tier.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_tier"))
    }
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?1?\d{9,15}$").expect("valid phone regex"))
}

/// Validates a phone number in loose E.164 form: optional +, optional
/// country code 1, then 9-15 digits. Empty phone is allowed (SMS optional).
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.is_empty() || phone_regex().is_match(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone"))
    }
}

fn zip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("valid zip regex"))
}

/// Validates a US ZIP code (5 digits, optional +4 extension)
pub fn validate_zip_code(zip: &str) -> Result<(), ValidationError> {
    if zip_regex().is_match(zip) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_zip_code"))
    }
}
