use super::BookingError;

/// Prefix prepended to numbers entered in national form (`01...` -> `+201...`).
pub const DEFAULT_COUNTRY_PREFIX: &str = "+2";

/// Canonical `+<country><digits>` form used as the patient lookup key.
pub fn normalize_phone(raw: &str) -> Result<String, BookingError> {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    if s.is_empty() {
        return Err(BookingError::validation("phone number is required"));
    }

    if let Some(rest) = s.strip_prefix("00") {
        s = format!("+{rest}");
    }

    if !s.starts_with('+') {
        s = format!("{DEFAULT_COUNTRY_PREFIX}{s}");
    }

    let digits = &s[1..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(BookingError::validation(
            "phone number must contain only digits after +",
        ));
    }

    if digits.len() > 15 {
        return Err(BookingError::validation(
            "phone number too long for E.164 (max 15 digits)",
        ));
    }

    Ok(s)
}
