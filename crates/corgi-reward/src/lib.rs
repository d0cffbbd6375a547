//! # corgi-reward
//!
//! Reward calculation for confirmed sightings.
//!
//! The reward is linear in the corgi count and clamped to a maximum. The
//! calculation is pure: the same count and rate always give the same amount,
//! so re-running settlement for a sighting never disagrees with an amount
//! already recorded.

use corgi_types::{validate_corgi_count, TokenAmount, ValidationError};
use serde::{Deserialize, Serialize};

/// Default reward rate: one coin per corgi.
pub const DEFAULT_COINS_PER_CORGI: u64 = 1;

/// Default clamp: a single sighting never pays more than 100 coins.
pub const DEFAULT_MAX_REWARD_COINS: u64 = 100;

/// Error types for reward calculation.
#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The configured rate overflows base units.
    #[error("reward rate overflow: {coins_per_corgi} coins per corgi")]
    Overflow {
        coins_per_corgi: u64,
    },

    /// A zero rate would mint zero-amount transactions.
    #[error("reward rate must be non-zero")]
    ZeroRate,
}

/// Convenience result type for reward operations.
pub type Result<T> = std::result::Result<T, RewardError>;

/// Exchange-rate configuration for sighting rewards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCalculator {
    coins_per_corgi: u64,
    max_reward_coins: u64,
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self {
            coins_per_corgi: DEFAULT_COINS_PER_CORGI,
            max_reward_coins: DEFAULT_MAX_REWARD_COINS,
        }
    }
}

impl RewardCalculator {
    /// Create a calculator, rejecting rates that cannot produce a valid amount.
    pub fn new(coins_per_corgi: u64, max_reward_coins: u64) -> Result<Self> {
        if coins_per_corgi == 0 || max_reward_coins == 0 {
            return Err(RewardError::ZeroRate);
        }
        TokenAmount::from_coins(max_reward_coins).ok_or(RewardError::Overflow { coins_per_corgi })?;
        Ok(Self {
            coins_per_corgi,
            max_reward_coins,
        })
    }

    pub fn coins_per_corgi(&self) -> u64 {
        self.coins_per_corgi
    }

    pub fn max_reward_coins(&self) -> u64 {
        self.max_reward_coins
    }

    /// Reward for a sighting of `corgi_count` corgis, in base units.
    ///
    /// # Errors
    ///
    /// - [`RewardError::Invalid`] if the count is outside 1..=100
    pub fn reward_for(&self, corgi_count: u32) -> Result<TokenAmount> {
        let count = validate_corgi_count(corgi_count)?;
        let coins = u64::from(count)
            .saturating_mul(self.coins_per_corgi)
            .min(self.max_reward_coins);
        TokenAmount::from_coins(coins).ok_or(RewardError::Overflow {
            coins_per_corgi: self.coins_per_corgi,
        })
    }
}
