// Validation utilities module
// Custom validator functions for request DTOs

use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

static PHONE: OnceLock<Option<Regex>> = OnceLock::new();
static POSTCODE: OnceLock<Option<Regex>> = OnceLock::new();
static VOUCHER_CODE: OnceLock<Option<Regex>> = OnceLock::new();

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .map_or(false, |re| re.is_match(value))
}

/// Phone numbers: digits, spaces, brackets and dashes with an optional leading +
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if matches(&PHONE, r"^\+?[0-9][0-9 ()\-]{5,19}$", phone.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone_number"))
    }
}

/// Postcodes: up to 10 alphanumeric characters and spaces
pub fn validate_postcode(postcode: &str) -> Result<(), ValidationError> {
    if matches(&POSTCODE, r"^[A-Za-z0-9][A-Za-z0-9 ]{1,9}$", postcode.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_postcode"))
    }
}

/// Voucher codes must not contain whitespace
pub fn validate_voucher_code(code: &str) -> Result<(), ValidationError> {
    if matches(&VOUCHER_CODE, r"^\S+$", code) {
        Ok(())
    } else {
        Err(ValidationError::new("voucher_code_contains_whitespace"))
    }
}

/// Voucher discounts are whole percentages between 1 and 100
pub fn validate_discount_percent(discount: i32) -> Result<(), ValidationError> {
    if (1..=100).contains(&discount) {
        Ok(())
    } else {
        Err(ValidationError::new("discount_out_of_range"))
    }
}
