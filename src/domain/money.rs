use std::fmt;

/// Money is represented as integer cents to avoid floating-point precision issues.
/// 1 unit = 100 cents, so 30.00 = 3000 cents.
pub type Cents = i64;

/// Largest accepted difference between the sum of custom shares and the
/// expense amount (0.01).
pub const SHARE_TOLERANCE: Cents = 1;

/// Format cents as a human-readable currency string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Parse a decimal string into cents.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
///
/// More than two decimal places is rejected rather than silently truncated,
/// since shares have to add up to the cent.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, decimal_str) = match digits.split_once('.') {
        Some((units, decimals)) => (units, decimals),
        None => (digits, ""),
    };

    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }
    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !decimal_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str
            .parse()
            .map_err(|_| ParseCentsError::InvalidFormat)?
    };

    let decimal_cents: i64 = match decimal_str.len() {
        0 => 0,
        // "12.5" means 50 cents
        1 => decimal_str.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        2 => decimal_str.parse().map_err(|_| ParseCentsError::InvalidFormat)?,
        _ => return Err(ParseCentsError::TooManyDecimals),
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimal_cents))
        .ok_or(ParseCentsError::Overflow)?;
    Ok(if negative { -cents } else { cents })
}

/// Divide a non-negative amount into `parts` pieces, rounding each piece to
/// the cent with round-half-up.
///
/// The pieces are not guaranteed to add back up to `amount`. Works in
/// `i128` so any `Cents` value can be divided.
pub fn divide_half_up(amount: Cents, parts: usize) -> Cents {
    debug_assert!(amount >= 0, "amount must not be negative");
    debug_assert!(parts > 0, "cannot divide into zero parts");
    let amount = i128::from(amount);
    let parts = parts as i128;
    let piece = (2 * amount + parts) / (2 * parts);
    // A piece never exceeds a non-negative amount
    Cents::try_from(piece).unwrap_or(Cents::MAX)
}

/// Returns true if `a` and `b` differ by at most [`SHARE_TOLERANCE`].
pub fn within_tolerance(a: Cents, b: Cents) -> bool {
    a.abs_diff(b) <= SHARE_TOLERANCE.unsigned_abs()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    TooManyDecimals,
    Overflow,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::TooManyDecimals => {
                write!(f, "money amounts have at most two decimal places")
            }
            ParseCentsError::Overflow => write!(f, "money amount is too large"),
        }
    }
}

impl std::error::Error for ParseCentsError {}
