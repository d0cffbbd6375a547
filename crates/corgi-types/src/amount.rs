//! Token and wish amounts.
//!
//! All ledger arithmetic happens on integer base units. Floating point never
//! touches a monetary value.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{ValidationError, BASE_UNITS_PER_COIN, MAX_WISH_AMOUNT_CENTS, TOKEN_DECIMALS};

/// Base units per wish cent (10^9 / 100).
const BASE_UNITS_PER_CENT: u64 = BASE_UNITS_PER_COIN / 100;

/// An amount of the reward token in base units.
///
/// Serialised as a decimal string of base units so that JavaScript clients
/// never round it through an IEEE double.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u64);

impl TokenAmount {
    /// The zero amount.
    pub const ZERO: TokenAmount = TokenAmount(0);

    /// Wrap a raw base-unit value.
    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    /// Whole coins to base units. `None` on overflow.
    pub fn from_coins(coins: u64) -> Option<Self> {
        coins.checked_mul(BASE_UNITS_PER_COIN).map(Self)
    }

    /// The raw base-unit value.
    pub const fn base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Human-readable coin value with trailing zeros trimmed ("5", "12.5").
    pub fn to_coin_string(&self) -> String {
        let whole = self.0 / BASE_UNITS_PER_COIN;
        let frac = self.0 % BASE_UNITS_PER_COIN;
        if frac == 0 {
            return whole.to_string();
        }
        let digits = format!("{frac:0width$}", width = TOKEN_DECIMALS as usize);
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }

    /// SQLite stores INTEGER as i64.
    pub fn to_sql(&self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }

    /// Read back from an INTEGER column; negative values are rejected.
    pub fn from_sql(value: i64) -> Result<Self, ValidationError> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| ValidationError::MalformedAmount(value.to_string()))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(s) => s
                .parse::<u64>()
                .map(Self)
                .map_err(|e| serde::de::Error::custom(format!("invalid token amount {s:?}: {e}"))),
        }
    }
}

/// A wish price with two-decimal currency semantics, held in cents.
///
/// Always within `0 < amount <= 1000.00`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WishAmount(u64);

impl WishAmount {
    /// Construct from cents, enforcing the allowed range.
    pub fn from_cents(cents: u64) -> Result<Self, ValidationError> {
        if cents == 0 || cents > MAX_WISH_AMOUNT_CENTS {
            return Err(ValidationError::AmountOutOfRange(format_cents(cents)));
        }
        Ok(Self(cents))
    }

    pub fn cents(&self) -> u64 {
        self.0
    }

    /// The same value in token base units.
    pub fn to_token_amount(&self) -> TokenAmount {
        // cents <= 100_000, so this cannot overflow.
        TokenAmount(self.0 * BASE_UNITS_PER_CENT)
    }

    /// Parse a decimal amount such as "12", "12.5" or "999.99".
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        let value = Decimal::from_str(input)
            .map_err(|_| ValidationError::MalformedAmount(input.to_string()))?;
        Self::from_decimal(value)
    }

    /// Convert a decimal value, rejecting more than two decimal places.
    pub fn from_decimal(value: Decimal) -> Result<Self, ValidationError> {
        let normalized = value.normalize();
        if normalized.scale() > 2 {
            return Err(ValidationError::AmountPrecision(normalized.to_string()));
        }
        if normalized <= Decimal::ZERO || normalized > Decimal::from(1000u32) {
            return Err(ValidationError::AmountOutOfRange(normalized.to_string()));
        }
        let cents = (normalized * Decimal::from(100u32))
            .trunc()
            .mantissa();
        let cents = u64::try_from(cents)
            .map_err(|_| ValidationError::AmountOutOfRange(normalized.to_string()))?;
        Self::from_cents(cents)
    }
}

impl fmt::Display for WishAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_cents(self.0))
    }
}

impl Serialize for WishAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_cents(self.0))
    }
}

impl<'de> Deserialize<'de> for WishAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

fn format_cents(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}
