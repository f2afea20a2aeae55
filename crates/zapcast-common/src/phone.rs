//! Phone number normalization
//!
//! Turns free-form user input ("+55 (21) 98888-7777", "11 99999 8888")
//! into the digits-only form the gateway addresses recipients by.

use serde::{Deserialize, Serialize};

/// Country code prepended to national-format numbers
pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// Shortest digit count accepted as a dispatchable number
pub const MIN_PHONE_DIGITS: usize = 10;

/// Longest digit count accepted as a dispatchable number
pub const MAX_PHONE_DIGITS: usize = 13;

/// Result of normalizing a raw phone string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPhone {
    /// Digits only, with the country code applied to national numbers
    pub normalized: String,
    /// Whether the input had an acceptable number of digits
    pub is_valid: bool,
}

/// Normalize a phone number using [`DEFAULT_COUNTRY_CODE`].
///
/// Never fails; invalid input is reported through `is_valid`.
pub fn normalize_phone(input: &str) -> NormalizedPhone {
    normalize_phone_with(input, DEFAULT_COUNTRY_CODE)
}

/// Normalize a phone number, prefixing `country_code` to 10 and 11 digit
/// national numbers.
pub fn normalize_phone_with(input: &str, country_code: &str) -> NormalizedPhone {
    let digits = digits_only(input);
    let is_valid = (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len());

    let normalized = match digits.len() {
        10 | 11 => format!("{}{}", country_code, digits),
        _ => digits,
    };

    NormalizedPhone {
        normalized,
        is_valid,
    }
}

/// Strip everything but ASCII digits.
pub fn digits_only(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Count the ASCII digits in a string
pub fn digit_count(input: &str) -> usize {
    input.chars().filter(char::is_ascii_digit).count()
}
