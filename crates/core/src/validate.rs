//! Stateless row validators for keys entering the system.

use crate::model::{DAILY_KEY_BYTE_COUNT, ROLLING_PERIOD_MAX, ROLLING_PERIOD_MIN};

/// ISO-3166-1 alpha-2 codes of the federation member set.
pub const MEMBER_REGION_CODES: &[&str] = &[
    "AT", "BE", "BG", "CH", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GB", "GR", "HR", "HU",
    "IE", "IS", "IT", "LI", "LT", "LU", "LV", "MT", "NL", "NO", "PL", "PT", "RO", "SE", "SI", "SK",
];

/// Accepts exactly the member codes: upper case, no whitespace, no separators.
pub fn is_valid_region_code(code: &str) -> bool {
    MEMBER_REGION_CODES.contains(&code)
}

/// Inclusive `[min, today]` check on a rolling start number.
pub fn is_valid_rolling_start(rolling_start_number: i64, min: i32, today: i32) -> bool {
    i64::from(min) <= rolling_start_number && rolling_start_number <= i64::from(today)
}

/// Inclusive `[1, max]` check on a rolling period.
pub fn is_valid_rolling_period(rolling_period: i64, max: i32) -> bool {
    let max = max.min(ROLLING_PERIOD_MAX);
    i64::from(ROLLING_PERIOD_MIN) <= rolling_period && rolling_period <= i64::from(max)
}

pub fn is_valid_key_data(key_data: &[u8]) -> bool {
    key_data.len() == DAILY_KEY_BYTE_COUNT
}
