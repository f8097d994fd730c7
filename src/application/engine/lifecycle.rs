//! Lifecycle Manager.
//!
//! `Engine::execute` applies the passthrough configuration to the initial
//! strategy state, seeds, opens live subscriptions, then spawns the
//! Serial Processor and the intake tasks that feed it. `stop_execution`
//! is the sole cooperative cancellation path: it invokes `on_end`,
//! flattens any open position, and latches the terminal state. `invoke`
//! funnels arbitrary external state mutation through the same serial
//! discipline everything else uses.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::info;

use crate::application::engine::fetcher::ThrottledFetcher;
use crate::application::engine::intake::{self, IntakeContext};
use crate::application::engine::processor::{EngineCommand, SerialProcessor};
use crate::application::engine::seeder;
use crate::config::EngineConfig;
use crate::domain::events::EngineEvent;
use crate::domain::ports::{PerfManager, PriceFeed, RestClient, Strategy, WsManager};

/// A running engine instance. Dropping this without calling
/// `stop_execution` leaves the processor task running in the background
/// until its command channel is dropped.
pub struct Engine<Strat: Strategy> {
    cmd_tx: mpsc::UnboundedSender<EngineCommand<Strat::State>>,
    events_tx: broadcast::Sender<EngineEvent>,
    stopped_flag: Arc<AtomicBool>,
}

impl<Strat: Strategy + 'static> Engine<Strat> {
    /// Seeds the strategy, opens live subscriptions, and starts the
    /// Serial Processor. Returns once the engine is live; the processor
    /// and intake tasks continue running in the background.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        config: EngineConfig,
        strategy: Arc<Strat>,
        initial_state: Strat::State,
        rest_client: Arc<dyn RestClient>,
        ws_manager: Arc<dyn WsManager>,
        price_feed: Arc<dyn PriceFeed>,
        perf_manager: Arc<dyn PerfManager>,
    ) -> Result<Self> {
        let fetcher = Arc::new(ThrottledFetcher::new(rest_client));
        let now_ms = chrono::Utc::now().timestamp_millis();

        let initial_state = strategy.apply_passthrough_config(initial_state, &config.passthrough);

        let seeded = seeder::seed(
            &fetcher,
            strategy.as_ref(),
            initial_state,
            &config.symbol,
            config.timeframe,
            config.seed_candle_count,
            now_ms,
        )
        .await?;

        let candle_rx = ws_manager
            .subscribe_candles(&config.symbol, config.timeframe)
            .await?;
        let trade_rx = if config.include_trades {
            Some(ws_manager.subscribe_trades(&config.symbol).await?)
        } else {
            None
        };
        let auth_rx = ws_manager.subscribe_auth().await?;
        let lifecycle_rx = ws_manager.subscribe_socket_lifecycle().await?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(256);
        let stopped_flag = Arc::new(AtomicBool::new(false));
        let perf_updates_rx = perf_manager.subscribe_updates();

        let processor = SerialProcessor::new(
            strategy,
            seeded.state,
            price_feed.clone(),
            perf_manager,
            fetcher,
            events_tx.clone(),
            cmd_tx.clone(),
            config.symbol.clone(),
            config.timeframe,
            config.candle_price,
            seeded.last_candle,
            stopped_flag.clone(),
        );
        tokio::spawn(processor.run(cmd_rx));

        let intake_ctx = Arc::new(IntakeContext::<Strat> {
            symbol: config.symbol.clone(),
            timeframe: config.timeframe,
            include_trades: config.include_trades,
            cmd_tx: cmd_tx.clone(),
        });

        tokio::spawn(intake::run_candle_intake(candle_rx, intake_ctx.clone()));
        if let Some(trade_rx) = trade_rx {
            tokio::spawn(intake::run_trade_intake(trade_rx, intake_ctx.clone()));
        }
        tokio::spawn(intake::run_auth_intake(auth_rx, intake_ctx));
        tokio::spawn(intake::run_lifecycle_intake::<Strat>(lifecycle_rx, cmd_tx.clone()));
        tokio::spawn(intake::run_perf_intake::<Strat>(
            perf_updates_rx,
            cmd_tx.clone(),
        ));

        info!(symbol = %config.symbol, tf = %config.timeframe, "engine live");

        Ok(Self {
            cmd_tx,
            events_tx,
            stopped_flag,
        })
    }

    /// Idempotent: a second call while already stopping/stopped resolves
    /// once the first `Stop` completes, without sending a second one.
    pub async fn stop_execution(&self) {
        if self.stopped_flag.swap(true, Ordering::SeqCst) {
            return;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.cmd_tx.send(EngineCommand::Stop { ack: ack_tx }).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Funnels an external state mutation through the processor's serial
    /// discipline: `handler` runs with exclusive access to the strategy
    /// state, the same as any other callback.
    pub fn invoke<F, Fut>(&self, handler: F)
    where
        F: FnOnce(Strat::State) -> Fut + Send + 'static,
        Fut: Future<Output = Strat::State> + Send + 'static,
    {
        let boxed: Box<
            dyn FnOnce(Strat::State) -> Pin<Box<dyn Future<Output = Strat::State> + Send>> + Send,
        > = Box::new(move |s| Box::pin(handler(s)));
        let _ = self.cmd_tx.send(EngineCommand::Invoke(boxed));
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }
}
