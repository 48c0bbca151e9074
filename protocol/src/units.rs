//! # Fixed-Point Money
//!
//! Every amount in Harbor is a `u64` count of micro-units: one stablecoin
//! unit is `1_000_000` micros. Every rate is a `u32` count of basis points:
//! `450` bps is 4.50%, and a collateral ratio of 1.5 is `15_000` bps.
//!
//! Multiplying the two goes through `u128` so that a billion-unit deposit
//! at a silly APY still cannot overflow mid-calculation. Signed results
//! (net profits, remaining allowances) are `i64` micros.
//!
//! Floats appear in exactly one place: nowhere. Even display formatting is
//! done with integer division.

use std::fmt;

/// Amount in micro-units (6 decimal places).
pub type Micros = u64;

/// Signed amount in micro-units. Used for projections that can go negative.
pub type SignedMicros = i64;

/// Rate in basis points. 1 bp = 0.01%.
pub type Bps = u32;

/// Micro-units per whole stablecoin unit.
pub const MICROS_PER_UNIT: u64 = 1_000_000;

/// Decimal places carried by [`Micros`].
pub const MICRO_DECIMALS: usize = 6;

/// Basis points in 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Converts whole units to micros. Usable in `const` context, which is the
/// main reason it exists.
pub const fn units(whole: u64) -> Micros {
    whole * MICROS_PER_UNIT
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from parsing a decimal amount string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    #[error("amount is empty")]
    Empty,

    #[error("amount '{0}' is not a non-negative decimal number")]
    Malformed(String),

    #[error("amount '{input}' has more than {max} decimal places")]
    TooPrecise { input: String, max: usize },

    #[error("amount '{0}' is too large")]
    Overflow(String),
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

/// Applies a basis-point rate to an amount, rounding toward zero.
///
/// `apply_bps(units(10_000), 450) == units(450)`.
pub fn apply_bps(amount: Micros, rate: Bps) -> Micros {
    let scaled = (amount as u128 * rate as u128) / BPS_DENOMINATOR as u128;
    scaled.min(u64::MAX as u128) as u64
}

/// Yield earned by `amount` at `rate` over `days` out of a `days_per_year`
/// year, rounding toward zero. Single division so the rounding error is at
/// most one micro.
pub fn prorated_yield(amount: Micros, rate: Bps, days: u32, days_per_year: u32) -> Micros {
    if days_per_year == 0 {
        return 0;
    }
    let numerator = amount as u128 * rate as u128 * days as u128;
    let denominator = BPS_DENOMINATOR as u128 * days_per_year as u128;
    (numerator / denominator).min(u64::MAX as u128) as u64
}

/// Saturating conversion from unsigned to signed micros.
pub fn to_signed(amount: Micros) -> SignedMicros {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Parsing & Formatting
// ---------------------------------------------------------------------------

/// Parses a decimal string like `"12.50"` or `"10000"` into micros.
///
/// Rejects signs, exponents, and anything with more than six decimals. An
/// amount of zero parses fine; whether zero is *acceptable* is the caller's
/// business.
pub fn parse_amount(input: &str) -> Result<Micros, AmountParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountParseError::Empty);
    }

    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !digits_only(whole) || !digits_only(frac) {
        return Err(AmountParseError::Malformed(input.to_string()));
    }
    if frac.len() > MICRO_DECIMALS {
        return Err(AmountParseError::TooPrecise {
            input: input.to_string(),
            max: MICRO_DECIMALS,
        });
    }

    let whole_value: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| AmountParseError::Overflow(input.to_string()))?
    };

    let mut frac_value: u64 = 0;
    for (i, b) in frac.bytes().enumerate() {
        let digit = (b - b'0') as u64;
        frac_value += digit * 10u64.pow((MICRO_DECIMALS - 1 - i) as u32);
    }

    whole_value
        .checked_mul(MICROS_PER_UNIT)
        .and_then(|w| w.checked_add(frac_value))
        .ok_or_else(|| AmountParseError::Overflow(input.to_string()))
}

/// Formats micros as a decimal string with trailing zeros trimmed to at
/// least two places: `12_500_000` → `"12.50"`, `1_234_567` → `"1.234567"`.
pub fn format_amount(amount: Micros) -> String {
    let whole = amount / MICROS_PER_UNIT;
    let frac = amount % MICROS_PER_UNIT;
    let mut frac_str = format!("{frac:06}");
    while frac_str.len() > 2 && frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{whole}.{frac_str}")
}

/// Signed counterpart of [`format_amount`].
pub fn format_signed(amount: SignedMicros) -> String {
    let magnitude = format_amount(amount.unsigned_abs());
    if amount < 0 {
        format!("-{magnitude}")
    } else {
        magnitude
    }
}

/// Renders basis points as a percentage string: `450` → `"4.50%"`.
pub fn bps_display(rate: Bps) -> String {
    format!("{}.{:02}%", rate / 100, rate % 100)
}

/// Newtype wrapper for logging amounts with `%` in tracing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount(pub Micros);

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_amount(self.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
