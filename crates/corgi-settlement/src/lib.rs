//! # corgi-settlement
//!
//! Turns confirmed corgi sightings into on-chain token transfers exactly once.
//!
//! ## Flow
//!
//! 1. A buddy confirms a sighting ([`sightings::SightingService::respond`]).
//!    The status change and, for wallet-less reporters, the pending reward row
//!    commit together.
//! 2. [`engine::SettlementEngine::settle_reward`] claims a pending transaction
//!    row, broadcasts through the [`chain::ChainClient`] under backoff, then
//!    finalizes the row and the bank mirror in one store transaction.
//! 3. [`sweep::Sweeper`] reconciles whatever a crash or a chain outage left
//!    behind.
//!
//! The store is the only shared mutable state. No database lock is held
//! across a chain call or a backoff sleep.

pub mod bank;
pub mod buddies;
pub mod chain;
pub mod engine;
pub mod error;
pub mod events;
#[cfg(any(test, feature = "test-support"))]
pub mod mock_chain;
pub mod onboarding;
pub mod pending;
pub mod sightings;
pub mod sweep;
pub mod users;
pub mod wishes;

use std::sync::Arc;

use rusqlite::Connection;

pub use chain::{ChainClient, ChainError, ChainTxStatus, TxReceipt};
pub use engine::{SettlementEngine, SettlementOutcome};
pub use error::{ErrorKind, Result, SettlementError};
pub use events::{Event, EventBus};

/// Shared handle to the ledger database.
pub type Db = Arc<tokio::sync::Mutex<Connection>>;

/// Wrap an open connection for sharing between services.
pub fn shared(conn: Connection) -> Db {
    Arc::new(tokio::sync::Mutex::new(conn))
}

/// Fixtures shared by the unit tests of this crate.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use corgi_db::queries::{bank, buddies, sightings, users};
    use corgi_retry::RetryConfig;
    use corgi_reward::RewardCalculator;
    use corgi_types::sighting::SightingStatus;
    use corgi_types::{Id, TokenAmount};

    use crate::mock_chain::MockChainClient;
    use crate::{Db, EventBus, SettlementEngine};

    pub const T0: u64 = 1_700_000_000;
    pub const BANK: &str = "EQBankBankBankBankBankBankBankBankBankBankBank00";

    pub fn wallet(n: u8) -> String {
        format!("0:{}", format!("{n:02x}").repeat(32))
    }

    pub fn coins(n: u64) -> TokenAmount {
        TokenAmount::from_coins(n).expect("coins")
    }

    pub struct Fixture {
        pub db: Db,
        pub chain: Arc<MockChainClient>,
        pub engine: SettlementEngine,
        pub events: EventBus,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self::with_retry(RetryConfig::no_retry())
        }

        pub fn with_retry(retry: RetryConfig) -> Self {
            let conn = corgi_db::open_memory().expect("open db");
            bank::init(&conn, BANK, coins(1_000), T0).expect("init bank");
            let db = crate::shared(conn);
            let chain = Arc::new(MockChainClient::new());
            let events = EventBus::new(64);
            let engine = SettlementEngine::new(
                db.clone(),
                chain.clone(),
                RewardCalculator::default(),
                retry,
                events.clone(),
            );
            Self {
                db,
                chain,
                engine,
                events,
            }
        }

        /// Two users in an active pair; the first gets `wallet` if given.
        pub async fn buddies(&self, wallet: Option<&str>) -> (Id, Id) {
            let conn = self.db.lock().await;
            let a = users::insert(&conn, 1, Some("alice"), "Alice", T0).expect("user a");
            let b = users::insert(&conn, 2, Some("bob"), "Bob", T0).expect("user b");
            if let Some(address) = wallet {
                users::set_wallet(&conn, a, address, T0).expect("wallet");
            }
            let pair = buddies::insert(&conn, a, b, T0).expect("pair");
            buddies::activate(&conn, pair, T0).expect("activate");
            (a, b)
        }

        /// A sighting by `reporter` that `buddy` already confirmed.
        pub async fn confirmed_sighting(&self, reporter: Id, buddy: Id, count: u32) -> Id {
            let conn = self.db.lock().await;
            let id = sightings::insert(&conn, reporter, buddy, count, T0).expect("sighting");
            sightings::respond(&conn, id, SightingStatus::Confirmed, T0).expect("confirm");
            id
        }
    }
}
