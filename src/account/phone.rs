/// Phone number normalisation and validation
use crate::error::{ApiError, ApiResult};

/// Côte d'Ivoire country calling code
const CI_CALLING_CODE: &str = "225";

/// Two-digit operator prefixes valid for Ivorian numbers
const CI_PREFIXES: [&str; 6] = ["01", "05", "07", "25", "27", "09"];

/// Bring a user-entered number to `+<digits>` form.
///
/// A number already starting with `+` keeps its `+` and digits; any other
/// input is treated as digits of an international number.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("+{}", digits)
}

/// Validate a normalised number.
///
/// `+225` numbers must carry exactly ten local digits starting with a known
/// operator prefix; everything else must be a valid number for its region.
pub fn validate(normalized: &str) -> ApiResult<()> {
    let digits = normalized
        .strip_prefix('+')
        .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| ApiError::Validation("Invalid phone number".to_string()))?;

    if let Some(local) = digits.strip_prefix(CI_CALLING_CODE) {
        if local.len() != 10 || !CI_PREFIXES.contains(&&local[..2]) {
            return Err(ApiError::Validation(format!(
                "Invalid Ivorian phone number: expected 10 digits starting with {}",
                CI_PREFIXES.join(", ")
            )));
        }
        return Ok(());
    }

    match phonenumber::parse(None, normalized) {
        Ok(number) if phonenumber::is_valid(&number) => Ok(()),
        Ok(_) => Err(ApiError::Validation("Invalid phone number".to_string())),
        Err(e) => {
            tracing::debug!("Unparsable phone number {}: {}", normalized, e);
            Err(ApiError::Validation("Invalid phone number".to_string()))
        }
    }
}

/// Normalise then validate
pub fn parse(raw: &str) -> ApiResult<String> {
    let normalized = normalize(raw);
    validate(&normalized)?;
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("+225 07 07 07 07 07"), "+2250707070707");
        assert_eq!(normalize("225-0707070707"), "+2250707070707");
        assert_eq!(normalize("  +33 6 12 34 56 78 "), "+33612345678");
    }

    #[test]
    fn test_ivorian_numbers() {
        assert_ok!(parse("+2250707070707"));
        assert_ok!(parse("+2252712345678"));
        // unknown prefix
        assert_err!(parse("+2250307070707"));
        // eight-digit legacy format
        assert_err!(parse("+22507070707"));
    }

    #[test]
    fn test_generic_numbers() {
        assert_ok!(parse("+33612345678"));
        assert_ok!(parse("+14155552671"));
        assert_err!(parse("+1123"));
        assert_err!(parse("+0123456789"));
        assert_err!(parse(""));
        assert_err!(parse("+1234567890123456"));
    }

    #[test]
    fn test_unassigned_country_code_rejected() {
        assert_err!(parse("+99912345678"));
        // French number one digit short
        assert_err!(parse("+3361234567"));
    }
}
