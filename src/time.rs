//! Timeline ticks and duration helpers.
//!
//! One tick is one day. Dates are absolute tick counts from the root epoch
//! (date 0), which carries no entity-specific state.

use crate::error::SchemaError;

/// An absolute date or an elapsed span, in ticks (days).
pub type Tick = u64;

const WEEK: Tick = 7;
const MONTH: Tick = 30;
const YEAR: Tick = 365;

const HUNDRED: Tick = 100;
const THOUSAND: Tick = 1_000;
const MILLION: Tick = 1_000_000;
const BILLION: Tick = 1_000_000_000;
const TRILLION: Tick = 1_000_000_000_000;

/// Longest target residency a state may declare: 30 trillion years.
///
/// Keeps every exponent handed to matrix exponentiation well inside `u64`.
pub const MAX_TARGET_LENGTH: Tick = 10_950_000_000_000_000;

/// Unit conversions for expressing spans in ticks.
///
/// Products saturate at `u64::MAX` instead of wrapping.
///
/// ```
/// use branchline::time::TickExt;
///
/// assert_eq!(2u64.weeks(), 14);
/// assert_eq!(10u64.billion().years(), 3_650_000_000_000);
/// ```
pub trait TickExt {
    /// Span of `self` days.
    #[must_use]
    fn days(self) -> Tick;
    /// Span of `self` weeks.
    #[must_use]
    fn weeks(self) -> Tick;
    /// Span of `self` 30-day months.
    #[must_use]
    fn months(self) -> Tick;
    /// Span of `self` 365-day years.
    #[must_use]
    fn years(self) -> Tick;
    /// `self` × 100.
    #[must_use]
    fn hundred(self) -> Tick;
    /// `self` × 10³.
    #[must_use]
    fn thousand(self) -> Tick;
    /// `self` × 10⁶.
    #[must_use]
    fn million(self) -> Tick;
    /// `self` × 10⁹.
    #[must_use]
    fn billion(self) -> Tick;
    /// `self` × 10¹².
    #[must_use]
    fn trillion(self) -> Tick;
}

impl TickExt for u64 {
    fn days(self) -> Tick {
        self
    }

    fn weeks(self) -> Tick {
        self.saturating_mul(WEEK)
    }

    fn months(self) -> Tick {
        self.saturating_mul(MONTH)
    }

    fn years(self) -> Tick {
        self.saturating_mul(YEAR)
    }

    fn hundred(self) -> Tick {
        self.saturating_mul(HUNDRED)
    }

    fn thousand(self) -> Tick {
        self.saturating_mul(THOUSAND)
    }

    fn million(self) -> Tick {
        self.saturating_mul(MILLION)
    }

    fn billion(self) -> Tick {
        self.saturating_mul(BILLION)
    }

    fn trillion(self) -> Tick {
        self.saturating_mul(TRILLION)
    }
}

fn multiplier(token: &str) -> Option<Tick> {
    let multiplier = match token.to_ascii_lowercase().as_str() {
        "day" | "days" => 1,
        "week" | "weeks" => WEEK,
        "month" | "months" => MONTH,
        "year" | "years" => YEAR,
        "hundred" | "hundreds" => HUNDRED,
        "thousand" | "thousands" => THOUSAND,
        "million" | "millions" => MILLION,
        "billion" | "billions" => BILLION,
        "trillion" | "trillions" => TRILLION,
        _ => return None,
    };
    Some(multiplier)
}

/// Parses a target-length expression such as `"10 billion years 3 days"`.
///
/// A number starts a new term, every unit or scale word multiplies the
/// current term, and the terms are summed left to right. Words are
/// case-insensitive and may be singular or plural.
///
/// `state` only labels errors.
///
/// # Errors
///
/// Returns `SchemaError::UnrecognizedDurationToken` for an unknown word,
/// `SchemaError::DurationOverflow` if the sum leaves `u64`, and
/// `SchemaError::TargetLengthExceeded` above [`MAX_TARGET_LENGTH`].
pub fn parse_duration(expression: &str, state: &str) -> Result<Tick, SchemaError> {
    let overflow = || SchemaError::DurationOverflow {
        state: state.to_string(),
    };

    let mut total: Tick = 0;
    let mut term: Tick = 0;

    for token in expression.split_whitespace() {
        if let Ok(value) = token.parse::<Tick>() {
            total = total.checked_add(term).ok_or_else(overflow)?;
            term = value;
            continue;
        }

        let factor = multiplier(token).ok_or_else(|| SchemaError::UnrecognizedDurationToken {
            state: state.to_string(),
            token: token.to_string(),
        })?;
        term = term.checked_mul(factor).ok_or_else(overflow)?;
    }

    total = total.checked_add(term).ok_or_else(overflow)?;

    if total > MAX_TARGET_LENGTH {
        return Err(SchemaError::TargetLengthExceeded {
            state: state.to_string(),
            length: total,
            max: MAX_TARGET_LENGTH,
        });
    }

    Ok(total)
}
