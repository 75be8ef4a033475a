use rust_decimal::Decimal;

use crate::domain::voucher::VoucherMonth;
use crate::errors::ValidationError;

pub const MAX_REASON_LEN: usize = 2000;
pub const MAX_EMAIL_LEN: usize = 254;

/// Trims and checks the basic `local@domain.tld` shape. Returns the normalized address.
pub fn validate_email(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    if trimmed.chars().count() > MAX_EMAIL_LEN {
        return Err(ValidationError::TooLong { field, max: MAX_EMAIL_LEN });
    }

    let invalid = || ValidationError::InvalidEmail { field, value: trimmed.to_string() };
    let Some((local, domain)) = trimmed.split_once('@') else {
        return Err(invalid());
    };
    let well_formed = !local.is_empty()
        && !domain.contains('@')
        && !trimmed.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty());
    if !well_formed {
        return Err(invalid());
    }
    Ok(trimmed.to_string())
}

pub fn validate_optional_email(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => validate_email(field, value).map(Some),
        None => Ok(None),
    }
}

pub fn validate_rejection_reason(reason: &str) -> Result<String, ValidationError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing { field: "reason" });
    }
    if trimmed.chars().count() > MAX_REASON_LEN {
        return Err(ValidationError::TooLong { field: "reason", max: MAX_REASON_LEN });
    }
    Ok(trimmed.to_string())
}

pub fn validate_total_miles(total_miles: Decimal) -> Result<Decimal, ValidationError> {
    if total_miles.is_sign_negative() && !total_miles.is_zero() {
        return Err(ValidationError::NegativeMiles(total_miles));
    }
    Ok(total_miles)
}

pub fn validate_month(value: &str) -> Result<VoucherMonth, ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing { field: "month" });
    }
    VoucherMonth::parse(value).ok_or_else(|| ValidationError::InvalidMonth(value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::errors::ValidationError;
    use crate::domain::voucher::VoucherMonth;
    use crate::validation::{
        validate_email, validate_month, validate_optional_email, validate_rejection_reason,
        validate_total_miles, MAX_REASON_LEN,
    };

    #[test]
    fn emails_are_trimmed_and_shape_checked() {
        assert_eq!(
            validate_email("supervisor_email", "  boss@example.com "),
            Ok("boss@example.com".to_owned())
        );
        assert_eq!(
            validate_email("supervisor_email", ""),
            Err(ValidationError::Missing { field: "supervisor_email" })
        );
        for bad in ["boss", "boss@", "@example.com", "boss@example", "bo ss@example.com"] {
            assert!(
                matches!(
                    validate_email("supervisor_email", bad),
                    Err(ValidationError::InvalidEmail { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn blank_optional_email_is_absent() {
        assert_eq!(validate_optional_email("accountant_email", Some("  ")), Ok(None));
        assert_eq!(validate_optional_email("accountant_email", None), Ok(None));
        assert!(validate_optional_email("accountant_email", Some("nope")).is_err());
    }

    #[test]
    fn rejection_reason_must_be_present_and_bounded() {
        assert_eq!(
            validate_rejection_reason("   "),
            Err(ValidationError::Missing { field: "reason" })
        );
        assert_eq!(validate_rejection_reason(" wrong month "), Ok("wrong month".to_owned()));
        let long = "x".repeat(MAX_REASON_LEN + 1);
        assert_eq!(
            validate_rejection_reason(&long),
            Err(ValidationError::TooLong { field: "reason", max: MAX_REASON_LEN })
        );
    }

    #[test]
    fn negative_miles_are_rejected() {
        assert!(validate_total_miles(Decimal::ZERO).is_ok());
        assert!(validate_total_miles(Decimal::new(-5, 1)).is_err());
    }

    #[test]
    fn months_accept_year_month_or_any_day_inside_it() {
        let march = VoucherMonth::from_ym(2025, 3).expect("month");
        assert_eq!(validate_month("2025-03"), Ok(march));
        assert_eq!(validate_month("2025-03-17"), Ok(march));
        assert_eq!(validate_month(" "), Err(ValidationError::Missing { field: "month" }));
        assert_eq!(
            validate_month("March"),
            Err(ValidationError::InvalidMonth("March".to_string()))
        );
    }
}
