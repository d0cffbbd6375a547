//! Integration tests for the Corgi Buddy settlement pipeline.
//!
//! The library only holds the [`Harness`] the flows under `tests/` share:
//! an in-memory ledger, a scriptable chain and every service wired together.
//!
//! ```sh
//! cargo test -p corgi-integration-tests
//! ```

use std::sync::Arc;

use corgi_retry::RetryConfig;
use corgi_reward::RewardCalculator;
use corgi_settlement::bank::BankAccounting;
use corgi_settlement::buddies::BuddyService;
use corgi_settlement::mock_chain::MockChainClient;
use corgi_settlement::pending::PendingRewardLedger;
use corgi_settlement::sightings::SightingService;
use corgi_settlement::sweep::{SweepConfig, Sweeper};
use corgi_settlement::users::UserService;
use corgi_settlement::wishes::WishService;
use corgi_settlement::{Db, EventBus, SettlementEngine};
use corgi_types::{Id, TokenAmount};
use tokio::sync::watch;

/// Bank wallet the harness pays from.
pub const BANK: &str = "EQBankBankBankBankBankBankBankBankBankBankBank00";

/// Coins the bank mirror starts with.
pub const BANK_COINS: u64 = 1_000;

/// A raw-form TON address unique to `n`.
pub fn wallet(n: u8) -> String {
    format!("0:{}", format!("{n:02x}").repeat(32))
}

pub fn coins(n: u64) -> TokenAmount {
    TokenAmount::from_coins(n).expect("coins")
}

/// A cancel handle that never fires.
pub fn not_cancelled() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    drop(tx);
    rx
}

pub struct Harness {
    pub db: Db,
    pub chain: Arc<MockChainClient>,
    pub events: EventBus,
    pub engine: SettlementEngine,
    pub users: UserService,
    pub buddies: BuddyService,
    pub sightings: SightingService,
    pub wishes: WishService,
    pub pending: PendingRewardLedger,
    pub bank: BankAccounting,
}

impl Harness {
    /// No retries, so failures surface on the first attempt.
    pub async fn new() -> Self {
        Self::with_retry(RetryConfig::no_retry()).await
    }

    pub async fn with_retry(retry: RetryConfig) -> Self {
        let db = corgi_settlement::shared(corgi_db::open_memory().expect("open db"));
        let chain = Arc::new(MockChainClient::new());
        let events = EventBus::new(256);
        let engine = SettlementEngine::new(
            db.clone(),
            chain.clone(),
            RewardCalculator::default(),
            retry,
            events.clone(),
        );
        let bank = BankAccounting::new(db.clone());
        bank.init(BANK, coins(BANK_COINS)).await.expect("init bank");

        Self {
            users: UserService::new(engine.clone()),
            buddies: BuddyService::new(db.clone(), events.clone()),
            sightings: SightingService::new(engine.clone()),
            wishes: WishService::new(db.clone(), events.clone()),
            pending: PendingRewardLedger::new(db.clone()),
            bank,
            engine,
            db,
            chain,
            events,
        }
    }

    /// Register a user, optionally with a wallet.
    pub async fn user(&self, telegram_id: i64, name: &str, wallet: Option<&str>) -> Id {
        let user = self
            .users
            .upsert_user(telegram_id, None, name)
            .await
            .expect("upsert user");
        if let Some(address) = wallet {
            self.users
                .connect_wallet(user.id, address)
                .await
                .expect("connect wallet");
        }
        user.id
    }

    /// Pair two users through the request/confirm flow.
    pub async fn pair(&self, a: Id, b: Id) {
        let pair = self.buddies.request(a, b).await.expect("request buddy");
        self.buddies.confirm(pair.id, b).await.expect("confirm buddy");
    }

    /// Alice (with `alice_wallet`) and Bob (no wallet), paired.
    pub async fn alice_and_bob(&self, alice_wallet: Option<&str>) -> (Id, Id) {
        let alice = self.user(1, "Alice", alice_wallet).await;
        let bob = self.user(2, "Bob", None).await;
        self.pair(alice, bob).await;
        (alice, bob)
    }

    /// Sweeper that treats every pending row as stale.
    pub fn eager_sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.engine.clone(),
            SweepConfig {
                stale_after_secs: 0,
                ..SweepConfig::default()
            },
        )
    }
}
