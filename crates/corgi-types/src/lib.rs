//! # corgi-types
//!
//! Shared domain types used across the Corgi Buddy workspace.
//!
//! Entities mirror the ledger tables one-to-one. API payloads (the structs the
//! Mini App route layer serialises) use camelCase field names and export
//! TypeScript bindings through `ts-rs`.

pub mod amount;
pub mod api;
pub mod buddy;
pub mod ledger;
pub mod sighting;
pub mod user;
pub mod wish;

pub use amount::{TokenAmount, WishAmount};

/// Row identifier shared by every table.
pub type Id = i64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Token decimals (jetton base units per coin = 10^9).
pub const TOKEN_DECIMALS: u32 = 9;

/// Base units per whole coin.
pub const BASE_UNITS_PER_COIN: u64 = 1_000_000_000;

/// Smallest corgi count a sighting may report.
pub const MIN_CORGI_COUNT: u32 = 1;

/// Largest corgi count a sighting may report.
pub const MAX_CORGI_COUNT: u32 = 100;

/// Maximum wish description length in characters.
pub const MAX_WISH_DESCRIPTION_CHARS: usize = 500;

/// Maximum wish price in cents (1000.00 coins).
pub const MAX_WISH_AMOUNT_CENTS: u64 = 100_000;

/// Input rejected before any store mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("corgi count must be between {MIN_CORGI_COUNT} and {MAX_CORGI_COUNT}, got {0}")]
    CorgiCountOutOfRange(u32),

    #[error("wish description must not be empty")]
    EmptyDescription,

    #[error("wish description exceeds {MAX_WISH_DESCRIPTION_CHARS} characters ({0})")]
    DescriptionTooLong(usize),

    #[error("amount must be greater than 0 and at most 1000, got {0}")]
    AmountOutOfRange(String),

    #[error("amount has more than two decimal places: {0}")]
    AmountPrecision(String),

    #[error("malformed amount: {0}")]
    MalformedAmount(String),

    #[error("invalid TON wallet address: {0}")]
    InvalidWalletAddress(String),

    #[error("unknown {kind} value: {value}")]
    UnknownEnumValue {
        /// Which enum failed to parse.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Check a reported corgi count against the allowed range.
pub fn validate_corgi_count(count: u32) -> Result<u32, ValidationError> {
    if (MIN_CORGI_COUNT..=MAX_CORGI_COUNT).contains(&count) {
        Ok(count)
    } else {
        Err(ValidationError::CorgiCountOutOfRange(count))
    }
}

/// Check a wish description (trimmed, non-empty, at most 500 characters).
pub fn validate_wish_description(description: &str) -> Result<String, ValidationError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyDescription);
    }
    let len = trimmed.chars().count();
    if len > MAX_WISH_DESCRIPTION_CHARS {
        return Err(ValidationError::DescriptionTooLong(len));
    }
    Ok(trimmed.to_string())
}

/// Check the shape of a TON wallet address.
///
/// Accepts the raw form (`<workchain>:<64 hex>`) and the 48-character
/// user-friendly form (base64 or base64url alphabet). Checksums are left to
/// the chain client.
pub fn validate_wallet_address(address: &str) -> Result<String, ValidationError> {
    let address = address.trim();
    let invalid = || ValidationError::InvalidWalletAddress(address.to_string());

    if let Some((workchain, hash)) = address.split_once(':') {
        if !matches!(workchain, "0" | "-1") {
            return Err(invalid());
        }
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        return Ok(address.to_string());
    }

    let friendly = address.len() == 48
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '/'));
    if friendly {
        Ok(address.to_string())
    } else {
        Err(invalid())
    }
}

/// Implements `as_str`, `Display` and `FromStr` for a lowercase string enum.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Database and wire representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err($crate::ValidationError::UnknownEnumValue {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use string_enum;
