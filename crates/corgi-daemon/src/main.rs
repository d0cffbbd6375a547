//! corgi-daemon: the Corgi Buddy settlement daemon.
//!
//! Single OS process running a Tokio runtime. The Mini App route layer talks
//! to it over JSON-RPC on a Unix socket; rewards are paid through the
//! signer/relayer configured under `[chain]`.

mod chain_http;
mod commands;
mod config;
mod notify;
mod rpc;
mod schedule;

use std::sync::Arc;
use std::time::Duration;

use corgi_reward::RewardCalculator;
use corgi_settlement::bank::BankAccounting;
use corgi_settlement::buddies::BuddyService;
use corgi_settlement::pending::PendingRewardLedger;
use corgi_settlement::sightings::SightingService;
use corgi_settlement::sweep::Sweeper;
use corgi_settlement::users::UserService;
use corgi_settlement::wishes::WishService;
use corgi_settlement::{ChainClient, Db, Event, EventBus, SettlementEngine};
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

use crate::chain_http::HttpChainClient;
use crate::config::DaemonConfig;
use crate::notify::LogSender;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    pub db: Db,
    pub config: DaemonConfig,
    pub event_bus: EventBus,
    pub engine: SettlementEngine,
    pub users: UserService,
    pub buddies: BuddyService,
    pub sightings: SightingService,
    pub wishes: WishService,
    pub pending: PendingRewardLedger,
    pub bank: BankAccounting,
    pub sweeper: Sweeper,
    /// Flipped to true on shutdown; sweeps stop at the next row.
    pub sweep_cancel: watch::Sender<bool>,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    /// Wire every service around one database and chain client.
    pub fn build(
        db: Db,
        chain: Arc<dyn ChainClient>,
        config: DaemonConfig,
    ) -> anyhow::Result<Self> {
        let calculator =
            RewardCalculator::new(config.rewards.coins_per_corgi, config.rewards.max_reward_coins)?;
        let event_bus = EventBus::new(1000);
        let engine = SettlementEngine::new(
            db.clone(),
            chain,
            calculator,
            config.retry.clone(),
            event_bus.clone(),
        );
        let (sweep_cancel, _) = watch::channel(false);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            users: UserService::new(engine.clone()),
            buddies: BuddyService::new(db.clone(), event_bus.clone()),
            sightings: SightingService::new(engine.clone()),
            wishes: WishService::new(db.clone(), event_bus.clone()),
            pending: PendingRewardLedger::new(db.clone()),
            bank: BankAccounting::new(db.clone()),
            sweeper: Sweeper::new(engine.clone(), config.sweep.thresholds.clone()),
            engine,
            db,
            config,
            event_bus,
            sweep_cancel,
            shutdown_tx,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_directive().parse()?),
        )
        .init();

    info!("Corgi Buddy daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Open database
    let db_path = data_dir.join("corgi.db");
    let db = corgi_settlement::shared(corgi_db::open(&db_path)?);

    // 3. Chain client
    let chain = Arc::new(HttpChainClient::new(
        &config.chain.endpoint,
        Duration::from_secs(config.chain.request_timeout_secs),
    )?);

    // 4. Build daemon state
    let state = Arc::new(DaemonState::build(db, chain, config)?);

    // 5. Bank mirror
    let bank = state
        .bank
        .init(
            &state.config.chain.bank_wallet_address,
            state.config.chain.initial_bank_balance()?,
        )
        .await?;
    info!(
        wallet = %bank.wallet_address,
        balance = %bank.current_balance,
        "bank wallet ready"
    );

    // 6. Background tasks
    let notifier = notify::spawn_forwarder(
        &state.event_bus,
        Arc::new(LogSender),
        state.shutdown_tx.subscribe(),
    );
    let sweeps = (state.config.sweep.interval_secs > 0).then(|| {
        schedule::spawn_sweeper(
            state.sweeper.clone(),
            Duration::from_secs(state.config.sweep.interval_secs),
            state.sweep_cancel.subscribe(),
        )
    });

    // 7. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    state.event_bus.emit(Event::new(
        "DaemonStarted",
        None,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        }),
    ));

    // 8. Run the RPC server until shutdown
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown: stop sweeps between rows, then drain notifications.
    info!("Daemon shutting down gracefully");
    let _ = state.sweep_cancel.send(true);
    let _ = state.shutdown_tx.send(());
    if let Some(handle) = sweeps {
        if let Err(e) = handle.await {
            error!("sweep task ended abnormally: {}", e);
        }
    }
    let _ = notifier.await;

    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
