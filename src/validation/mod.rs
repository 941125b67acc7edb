use sqlx::types::BigDecimal;
use std::fmt;

pub const PROMO_CODE_MIN_LEN: usize = 3;
pub const PROMO_CODE_MAX_LEN: usize = 32;
pub const NOTES_MAX_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Expects the already upper-cased form.
pub fn validate_promo_code(code: &str) -> ValidationResult {
    validate_required("code", code)?;

    if code.len() < PROMO_CODE_MIN_LEN || code.len() > PROMO_CODE_MAX_LEN {
        return Err(ValidationError::new(
            "code",
            format!(
                "must be between {} and {} characters",
                PROMO_CODE_MIN_LEN, PROMO_CODE_MAX_LEN
            ),
        ));
    }

    if !code
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_' || ch == '-')
    {
        return Err(ValidationError::new(
            "code",
            "must contain only letters, digits, '_' and '-'",
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }

    Ok(())
}

pub fn validate_non_negative_amount(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount < &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must not be negative"));
    }

    Ok(())
}

/// At most two decimal places, the precision money is stored with.
pub fn validate_money_scale(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount.round(2) != *amount {
        return Err(ValidationError::new(field, "must have at most two decimal places"));
    }

    Ok(())
}
