//! Serial Processor, plus the execution state it owns.
//!
//! The processor is the single task that ever touches strategy state: it
//! owns a `VecDeque<QueueMessage>`, the last-candle/last-trade/
//! last-price-feed-update watermarks, and the `processing`/`paused`/
//! `stopped` flags. Every other component — Event Intake, the Closure
//! Timer, the Pause/Resume Controller, and external `Engine::invoke`
//! callers — talks to it exclusively through an `EngineCommand` sent over
//! an unbounded mpsc channel. Ownership, not a mutex, gives the
//! single-writer invariant its concurrency model relies on.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::application::engine::closure_timer;
use crate::application::engine::emitter;
use crate::application::engine::pause_resume;
use crate::config::CandlePriceField;
use crate::domain::errors::EngineError;
use crate::domain::events::EngineEvent;
use crate::domain::ports::{PerfManager, PriceFeed, Strategy};
use crate::domain::timeframe::Timeframe;
use crate::domain::types::{OrderCloseEvent, QueueMessage, Trade, Wallet};

pub type StateFn<S> = Box<dyn FnOnce(S) -> Pin<Box<dyn Future<Output = S> + Send>> + Send>;

/// Commands accepted by the processor task. The main message stream
/// lives inside `Enqueue`; everything else models a side channel into
/// the same single-writer loop.
pub enum EngineCommand<S> {
    Enqueue(QueueMessage),
    /// A price-feed-only trade tick, distinct from a tradeable `Trade`
    /// enqueue: pushes to `PriceFeed` and advances the watermark iff
    /// `mts` has moved forward, but never reaches `on_trade`.
    TradePriceTick(crate::domain::types::Trade),
    /// A perf-manager update tick. Triggers a results emission without
    /// touching the queue or any watermark.
    PerfTick { price: Decimal },
    SocketOpen,
    SocketClose,
    WatchdogFire {
        epoch: u64,
        expected_mts: i64,
        now_ms: i64,
    },
    Invoke(StateFn<S>),
    Stop {
        ack: oneshot::Sender<()>,
    },
}

/// Coarse lifecycle phase: fresh, then seeding, then live, oscillating
/// between paused and live until stopped. Fresh/seeding happen before a
/// processor exists (seeding is a free function the lifecycle manager
/// runs beforehand); once a processor is running it only ever occupies
/// the three phases below. Recorded for observability even though
/// `paused`/`stopped` are the fields actually consulted for control
/// flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Live,
    Paused,
    Stopped,
}

/// Per-kind counters surfaced as `tracing` fields rather than a separate
/// metrics crate. Cheap running counts, not a histogram — enough for an
/// operator tailing logs to see throughput and fault rate by kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineMetrics {
    pub candles_processed: u64,
    pub candle_closures: u64,
    pub trades_processed: u64,
    pub order_closes_processed: u64,
    pub wallet_events_processed: u64,
    pub pauses: u32,
    pub watchdog_fires: u32,
}

/// Execution state, minus the strategy state value itself (held
/// separately so the processor can borrow it for callbacks without
/// fighting the borrow checker over a single struct field).
pub struct EngineState {
    pub last_candle: Option<crate::domain::types::Candle>,
    pub last_trade: Option<Trade>,
    pub last_price_feed_update: i64,
    pub processing: bool,
    pub paused: bool,
    pub stopped: bool,
    pub paused_on: Option<i64>,
    pub resumed_on: Option<i64>,
    pub timer_epoch: u64,
    pub wallets: Vec<Wallet>,
    pub metrics: EngineMetrics,
}

impl EngineState {
    pub fn fresh() -> Self {
        Self {
            last_candle: None,
            last_trade: None,
            last_price_feed_update: i64::MIN,
            processing: false,
            paused: false,
            stopped: false,
            paused_on: None,
            resumed_on: None,
            timer_epoch: 0,
            wallets: Vec::new(),
            metrics: EngineMetrics::default(),
        }
    }

    /// Derives the coarse lifecycle phase from the control flags actually
    /// consulted elsewhere, so the two can never drift apart.
    pub fn phase(&self) -> LifecyclePhase {
        if self.stopped {
            LifecyclePhase::Stopped
        } else if self.paused {
            LifecyclePhase::Paused
        } else {
            LifecyclePhase::Live
        }
    }
}

pub struct SerialProcessor<Strat: Strategy> {
    strategy: Arc<Strat>,
    price_feed: Arc<dyn PriceFeed>,
    perf_manager: Arc<dyn PerfManager>,
    fetcher: Arc<crate::application::engine::fetcher::ThrottledFetcher>,
    events_tx: tokio::sync::broadcast::Sender<EngineEvent>,
    self_tx: mpsc::UnboundedSender<EngineCommand<Strat::State>>,
    symbol: String,
    timeframe: Timeframe,
    candle_price: CandlePriceField,
    queue: VecDeque<QueueMessage>,
    state: EngineState,
    /// `None` only while a command handler is transiently moving the
    /// value through an `Invoke` callback; never observable from outside
    /// `handle_command`.
    strategy_state: Option<Strat::State>,
    stopped_flag: Arc<AtomicBool>,
}

impl<Strat: Strategy> SerialProcessor<Strat> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy: Arc<Strat>,
        initial_state: Strat::State,
        price_feed: Arc<dyn PriceFeed>,
        perf_manager: Arc<dyn PerfManager>,
        fetcher: Arc<crate::application::engine::fetcher::ThrottledFetcher>,
        events_tx: tokio::sync::broadcast::Sender<EngineEvent>,
        self_tx: mpsc::UnboundedSender<EngineCommand<Strat::State>>,
        symbol: String,
        timeframe: Timeframe,
        candle_price: CandlePriceField,
        initial_last_candle: Option<crate::domain::types::Candle>,
        stopped_flag: Arc<AtomicBool>,
    ) -> Self {
        let mut state = EngineState::fresh();
        state.last_candle = initial_last_candle;
        Self {
            strategy,
            price_feed,
            perf_manager,
            fetcher,
            events_tx,
            self_tx,
            symbol,
            timeframe,
            candle_price,
            queue: VecDeque::new(),
            state,
            strategy_state: Some(initial_state),
            stopped_flag,
        }
    }

    /// Borrows the live strategy state. Panics if called while a command
    /// handler is mid-`Invoke`, which never happens from outside this
    /// module.
    fn state_ref(&self) -> &Strat::State {
        self.strategy_state
            .as_ref()
            .expect("strategy state missing outside Invoke handling")
    }

    fn set_state(&mut self, new_state: Strat::State) {
        self.strategy_state = Some(new_state);
    }

    /// Re-arms the closure watchdog against the current `lastCandle`.
    pub fn rearm_watchdog(&mut self, now_ms: i64) {
        let Some(last) = self.state.last_candle.clone() else {
            return;
        };
        self.state.timer_epoch += 1;
        let width = self.timeframe.width_ms();
        let threshold = (width * 3) / 2;
        let elapsed = now_ms - last.mts;
        let delay_ms = (threshold - elapsed).max(0);
        closure_timer::arm(
            self.self_tx.clone(),
            self.state.timer_epoch,
            last.mts,
            delay_ms,
        );
    }

    pub async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand<Strat::State>>) {
        info!(symbol = %self.symbol, tf = %self.timeframe, "serial processor started");
        while let Some(cmd) = cmd_rx.recv().await {
            if self.state.stopped {
                // Once stopped, enqueues are silently discarded. A
                // pending `Stop` ack still has to complete so a second
                // `stop_execution()` call resolves promptly, everything
                // else is simply dropped.
                if let EngineCommand::Stop { ack } = cmd {
                    let _ = ack.send(());
                }
                continue;
            }
            self.handle_command(cmd).await;
        }
        info!("serial processor exiting");
    }

    async fn handle_command(&mut self, cmd: EngineCommand<Strat::State>) {
        match cmd {
            EngineCommand::Enqueue(msg) => {
                self.queue.push_back(msg);
                debug!(queue_depth = self.queue.len(), "message enqueued");
                self.drain(chrono_now_ms()).await;
            }
            EngineCommand::TradePriceTick(trade) => {
                if trade.mts > self.state.last_price_feed_update {
                    let price = trade.price;
                    self.price_feed.update(price, trade.mts).await;
                    self.state.last_price_feed_update = trade.mts;
                }
            }
            EngineCommand::PerfTick { price } => {
                if !self.state.paused {
                    self.emit_results(Some(price)).await;
                }
            }
            EngineCommand::SocketOpen => {
                pause_resume::on_socket_open(self, chrono_now_ms()).await;
            }
            EngineCommand::SocketClose => {
                pause_resume::on_socket_close(self, chrono_now_ms());
            }
            EngineCommand::WatchdogFire {
                epoch,
                expected_mts,
                now_ms,
            } => {
                self.handle_watchdog_fire(epoch, expected_mts, now_ms).await;
            }
            EngineCommand::Invoke(handler) => {
                let current = self
                    .strategy_state
                    .take()
                    .expect("strategy state missing outside Invoke handling");
                let next = handler(current).await;
                self.set_state(next);
            }
            EngineCommand::Stop { ack } => {
                self.handle_stop().await;
                let _ = ack.send(());
            }
        }
    }

    async fn handle_watchdog_fire(&mut self, epoch: u64, expected_mts: i64, now_ms: i64) {
        if epoch != self.state.timer_epoch {
            debug!("stale watchdog fire ignored");
            return;
        }
        if self.state.paused || self.state.stopped {
            return;
        }
        let Some(last) = self.state.last_candle.clone() else {
            return;
        };
        if last.mts != expected_mts {
            return;
        }
        let width = self.timeframe.width_ms();
        let threshold = (width * 3) / 2;
        if now_ms - last.mts < threshold {
            // Spurious early fire (clock drift); let the re-armed timer
            // from the meantime take over.
            return;
        }
        let synthetic = crate::domain::types::Candle::synthetic(
            &self.symbol,
            self.timeframe,
            last.mts + width,
            last.close,
        );
        self.state.metrics.watchdog_fires += 1;
        warn!(mts = synthetic.mts, "closure watchdog firing, candle never closed");
        self.queue
            .push_back(QueueMessage::Candle(synthetic));
        self.drain(now_ms).await;
    }

    async fn handle_stop(&mut self) {
        if let Some(new_state) = self.strategy.on_end(self.state_ref()).await {
            self.set_state(new_state);
        }
        if let Some(position) = self.strategy.get_position(self.state_ref(), &self.symbol) {
            match self.strategy.close_open_positions(self.state_ref()).await {
                Ok(new_state) => self.set_state(new_state),
                Err(e) => {
                    let err = EngineError::StrategyCallback {
                        callback: "close_open_positions",
                        source: e,
                    };
                    error!(symbol = %position.symbol, error = %err, "failed to flatten open position on stop");
                    let _ = self.events_tx.send(EngineEvent::Error(err.to_string()));
                }
            }
        }
        self.state.stopped = true;
        self.stopped_flag.store(true, Ordering::SeqCst);
        info!("engine stopped");
    }

    /// Drains the queue FIFO, dispatching by message type.
    pub async fn drain(&mut self, now_ms: i64) {
        if self.state.paused || self.state.stopped {
            return;
        }
        self.state.processing = true;
        while let Some(msg) = self.queue.pop_front() {
            if self.state.paused || self.state.stopped {
                self.queue.push_front(msg);
                break;
            }
            self.dispatch(msg, now_ms).await;
        }
        self.state.processing = false;
    }

    async fn dispatch(&mut self, msg: QueueMessage, now_ms: i64) {
        match msg {
            QueueMessage::Candle(candle) => self.handle_candle(candle, now_ms).await,
            QueueMessage::Trade(trade) => self.handle_trade(trade).await,
            QueueMessage::OrderClose(event) => self.handle_order_close(event).await,
            QueueMessage::WalletSnapshot(wallets) => self.handle_wallet_snapshot(wallets),
            QueueMessage::WalletUpdate(update) => self.handle_wallet_update(update),
        }
    }

    async fn handle_candle(&mut self, candle: crate::domain::types::Candle, now_ms: i64) {
        self.state.metrics.candles_processed += 1;
        if candle.mts > self.state.last_price_feed_update {
            self.maybe_push_price_feed(&candle).await;
        }

        match &self.state.last_candle {
            None => {
                let price = self.candle_price.select(&candle);
                self.state.last_candle = Some(candle);
                self.rearm_watchdog(now_ms);
                self.emit_results(Some(price)).await;
            }
            Some(last) if candle.mts == last.mts => {
                let price = self.candle_price.select(&candle);
                self.state.last_candle = Some(candle);
                self.rearm_watchdog(now_ms);
                self.emit_results(Some(price)).await;
            }
            Some(last) if candle.mts > last.mts => {
                let closed = last.clone();
                self.state.metrics.candle_closures += 1;
                match self.strategy.on_candle(self.state_ref(), &closed).await {
                    Ok(new_state) => self.set_state(new_state),
                    Err(e) => {
                        let err = EngineError::StrategyCallback {
                            callback: "on_candle",
                            source: e,
                        };
                        error!(mts = closed.mts, error = %err, "on_candle failed, retaining last state");
                        let _ = self.events_tx.send(EngineEvent::Error(err.to_string()));
                    }
                }
                let price = self.candle_price.select(&closed);
                self.state.last_candle = Some(candle);
                self.rearm_watchdog(now_ms);
                self.emit_results(Some(price)).await;
            }
            Some(_) => {
                debug!(mts = candle.mts, "dropping stale candle");
            }
        }
    }

    async fn maybe_push_price_feed(&mut self, candle: &crate::domain::types::Candle) {
        let price = self.candle_price.select(candle);
        self.price_feed.update(price, candle.mts).await;
        self.state.last_price_feed_update = candle.mts;
    }

    async fn handle_trade(&mut self, trade: Trade) {
        if let Some(last) = &self.state.last_trade {
            if trade.id <= last.id {
                debug!(id = trade.id, "dropping duplicate/out-of-order trade");
                return;
            }
        }
        self.state.metrics.trades_processed += 1;
        let mut stamped = trade.clone();
        stamped.symbol = self.symbol.clone();

        match self.strategy.on_trade(self.state_ref(), &stamped).await {
            Ok(new_state) => self.set_state(new_state),
            Err(e) => {
                let err = EngineError::StrategyCallback {
                    callback: "on_trade",
                    source: e,
                };
                error!(id = stamped.id, error = %err, "on_trade failed, retaining last state");
                let _ = self.events_tx.send(EngineEvent::Error(err.to_string()));
            }
        }
        self.state.last_trade = Some(stamped.clone());
        self.emit_results(Some(stamped.price)).await;
    }

    async fn handle_order_close(&mut self, event: OrderCloseEvent) {
        self.state.metrics.order_closes_processed += 1;
        match self.strategy.on_order(self.state_ref(), &event).await {
            Ok(new_state) => self.set_state(new_state),
            Err(e) => {
                let err = EngineError::StrategyCallback {
                    callback: "on_order",
                    source: e,
                };
                error!(error = %err, "on_order failed, retaining last state");
                let _ = self.events_tx.send(EngineEvent::Error(err.to_string()));
            }
        }
        self.emit_results(None).await;
    }

    fn handle_wallet_snapshot(&mut self, wallets: Vec<Wallet>) {
        self.state.metrics.wallet_events_processed += 1;
        self.state.wallets = wallets;
    }

    fn handle_wallet_update(&mut self, update: crate::domain::types::WalletUpdate) {
        self.state.metrics.wallet_events_processed += 1;
        let Some(entry) = self
            .state
            .wallets
            .iter_mut()
            .find(|w| w.currency == update.currency && w.wallet_type == update.wallet_type)
        else {
            debug!(currency = %update.currency, "wallet update for unknown entry ignored");
            return;
        };
        if let Some(balance) = update.effective_balance() {
            entry.balance = balance;
        }
        if let Some(available) = update.effective_balance_available() {
            entry.balance_available = available;
        }
    }

    async fn emit_results(&self, trade_or_close_price: Option<Decimal>) {
        emitter::emit(
            &self.strategy,
            self.state_ref(),
            &self.symbol,
            &self.state,
            &*self.perf_manager,
            trade_or_close_price,
            self.candle_price,
            &self.events_tx,
        );
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn enqueue_front_batch(&mut self, msgs: Vec<QueueMessage>) {
        for msg in msgs.into_iter().rev() {
            self.queue.push_front(msg);
        }
    }

    pub fn stable_sort_queue(&mut self, fallback_mts: i64) {
        let mut items: Vec<QueueMessage> = self.queue.drain(..).collect();
        items.sort_by_key(|m| m.sort_mts(fallback_mts));
        self.queue = items.into();
    }

    pub fn fetcher(&self) -> &crate::application::engine::fetcher::ThrottledFetcher {
        &self.fetcher
    }

    pub fn emit_error(&self, message: String) {
        let _ = self.events_tx.send(EngineEvent::Error(message));
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn engine_state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    pub fn engine_state(&self) -> &EngineState {
        &self.state
    }
}

fn chrono_now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
