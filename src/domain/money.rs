use thiserror::Error;

/// Money is represented as integer cents to avoid floating-point drift.
/// For EUR/USD, 1 unit = 100 cents, so €50.00 = 5000 cents.
pub type Cents = i64;

/// Percentages are fixed-point with two decimals: 100% = 10_000.
pub type BasisPoints = i64;

/// One full share, i.e. 100.00%.
pub const FULL_SHARE: BasisPoints = 10_000;

/// Rounding tolerance (0.01) applied to split sums and settlement thresholds.
pub const TOLERANCE_CENTS: Cents = 1;

/// Format cents as a human-readable currency string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    let units = abs_cents / 100;
    let remainder = abs_cents % 100;
    format!("{}{}.{:02}", sign, units, remainder)
}

/// Parse a decimal string into cents.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
///
/// Digits past the second decimal are rounded half-up (away from zero)
/// on the third digit: "12.345" -> 1235, "12.344" -> 1234.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    parse_fixed_two(input)
}

/// Parse a percentage ("75", "33.33", "12.5%") into basis points.
pub fn parse_percent(input: &str) -> Result<BasisPoints, ParseCentsError> {
    let input = input.trim();
    parse_fixed_two(input.strip_suffix('%').unwrap_or(input))
}

/// Convert cents to a decimal number for JSON output.
pub fn cents_to_decimal(cents: Cents) -> f64 {
    cents as f64 / 100.0
}

/// Convert a decimal number to cents, rounding half away from zero.
pub fn decimal_to_cents(value: f64) -> Cents {
    (value * 100.0).round() as Cents
}

fn parse_fixed_two(input: &str) -> Result<i64, ParseCentsError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, decimal_str) = digits.split_once('.').unwrap_or((digits, ""));

    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }
    if !units_str.bytes().all(|b| b.is_ascii_digit())
        || !decimal_str.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str
            .parse()
            .map_err(|_| ParseCentsError::OutOfRange)?
    };

    let decimal = decimal_str.as_bytes();
    let digit = |idx: usize| decimal.get(idx).map_or(0, |d| i64::from(d - b'0'));
    let mut fraction = digit(0) * 10 + digit(1);
    if digit(2) >= 5 {
        fraction += 1;
    }

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or(ParseCentsError::OutOfRange)?;

    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("invalid money format")]
    InvalidFormat,

    #[error("amount out of range")]
    OutOfRange,
}

/// Serde adapter rendering cents as a decimal number (2500 -> 25.0).
pub mod decimal {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Cents, cents_to_decimal, decimal_to_cents};

    pub fn serialize<S: Serializer>(cents: &Cents, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(cents_to_decimal(*cents))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Cents, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(decimal_to_cents(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(5000), "50.00");
        assert_eq!(format_cents(1234), "12.34");
        assert_eq!(format_cents(100), "1.00");
        assert_eq!(format_cents(1), "0.01");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-5000), "-50.00");
        assert_eq!(format_cents(-1), "-0.01");
    }

    #[test]
    fn test_parse_cents() {
        assert_eq!(parse_cents("50.00"), Ok(5000));
        assert_eq!(parse_cents("50"), Ok(5000));
        assert_eq!(parse_cents("12.34"), Ok(1234));
        assert_eq!(parse_cents("12.5"), Ok(1250));
        assert_eq!(parse_cents("0.01"), Ok(1));
        assert_eq!(parse_cents(".50"), Ok(50));
        assert_eq!(parse_cents("50."), Ok(5000));
        assert_eq!(parse_cents("-50.00"), Ok(-5000));
    }

    #[test]
    fn test_parse_cents_rounds_half_up() {
        assert_eq!(parse_cents("12.345"), Ok(1235));
        assert_eq!(parse_cents("12.344"), Ok(1234));
        assert_eq!(parse_cents("100.999"), Ok(10100));
        assert_eq!(parse_cents("-12.345"), Ok(-1235));
        assert_eq!(parse_cents("33.3333"), Ok(3333));
    }

    #[test]
    fn test_parse_cents_invalid() {
        assert!(parse_cents("abc").is_err());
        assert!(parse_cents("12.34.56").is_err());
        assert!(parse_cents("").is_err());
        assert!(parse_cents("-").is_err());
        assert!(parse_cents(".").is_err());
        assert!(parse_cents("1e3").is_err());
        assert!(parse_cents("--5").is_err());
        assert_eq!(
            parse_cents("99999999999999999999"),
            Err(ParseCentsError::OutOfRange)
        );
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("75"), Ok(7500));
        assert_eq!(parse_percent("33.33"), Ok(3333));
        assert_eq!(parse_percent("12.5%"), Ok(1250));
    }

    #[test]
    fn test_decimal_conversion() {
        assert_eq!(cents_to_decimal(2500), 25.0);
        assert_eq!(cents_to_decimal(-1), -0.01);
        assert_eq!(decimal_to_cents(25.0), 2500);
        assert_eq!(decimal_to_cents(0.1 + 0.2), 30);
        assert_eq!(decimal_to_cents(-0.5), -50);
    }
}
