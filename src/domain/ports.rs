//! Injected collaborators.
//!
//! These traits are the engine's only contact with the outside world: a
//! REST candle endpoint, a WebSocket subscription manager, a price feed,
//! a performance manager, and the strategy itself. Concrete
//! implementations (a real exchange connector, or the in-memory mocks in
//! `crate::infrastructure::mock`) live outside this module.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc};

use crate::domain::timeframe::Timeframe;
use crate::domain::types::{Candle, OpenPosition, OrderCloseEvent, Trade, Wallet, WalletUpdate};

/// Parameters for a historical candle fetch. `sort = 1` requests
/// ascending order; the engine never requests descending order.
#[derive(Debug, Clone, Copy)]
pub struct HistoryQuery {
    pub start: i64,
    pub end: i64,
    pub limit: usize,
    pub sort: i8,
}

/// The REST candle endpoint, wrapped by the throttled fetcher. No retry
/// logic belongs here or in any implementor — that is the fetcher's
/// caller's problem.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Returns candles ascending by `mts` for `query.sort == 1`.
    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        query: HistoryQuery,
    ) -> Result<Vec<Candle>>;
}

/// Raw single-candle or single-trade updates as they arrive off the wire,
/// before Event Intake normalizes them into `QueueMessage`s. Snapshot
/// variants exist because the intake layer must recognize and drop them
/// (seeding owns history, so a resent snapshot is redundant).
#[derive(Debug, Clone)]
pub enum WsEvent {
    CandleSnapshot(Vec<Candle>),
    CandleSingle(Candle),
    TradeSnapshot(Vec<Trade>),
    TradeSingle(Trade),
    /// A trade tick usable as a price-feed source, distinct from a
    /// tradeable `TradeSingle` (an exchange may emit both for the same
    /// fill).
    TradePrice(Trade),
    OrderClose(OrderCloseEvent),
    WalletSnapshot(Vec<Wallet>),
    WalletUpdate(WalletUpdate),
}

/// Socket lifecycle notifications that drive the pause/resume controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketLifecycle {
    Open,
    Close,
}

/// Attaches subscriptions and hands back channels of normalized-ish wire
/// events. Collapses the usual "acquire a socket, then subscribe on it"
/// indirection into the subscribe call itself, since Rust has no need for
/// a separately-acquired socket handle to issue one.
#[async_trait]
pub trait WsManager: Send + Sync {
    async fn subscribe_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<mpsc::Receiver<WsEvent>>;

    async fn subscribe_trades(&self, symbol: &str) -> Result<mpsc::Receiver<WsEvent>>;

    /// Authenticated channels: order-close, wallet-snapshot, wallet-update.
    async fn subscribe_auth(&self) -> Result<mpsc::Receiver<WsEvent>>;

    async fn subscribe_socket_lifecycle(&self) -> Result<broadcast::Receiver<SocketLifecycle>>;
}

/// Monotonic price sink. Callers enforce `mts` monotonicity themselves
/// (the engine tracks `last_price_feed_update` and only calls `update`
/// when `mts` has advanced).
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn update(&self, price: Decimal, mts: i64);
}

/// One performance-manager tick, broadcast to anyone subscribed via
/// `PerfManager::subscribe_updates`.
#[derive(Debug, Clone, Copy)]
pub struct PerfUpdate {
    pub mts: i64,
    pub price: Decimal,
}

/// Performance / allocation accessors the result emitter consults on
/// every tick.
pub trait PerfManager: Send + Sync {
    fn subscribe_updates(&self) -> broadcast::Receiver<PerfUpdate>;
    fn allocation(&self) -> Decimal;
    fn position_size(&self) -> Decimal;
    fn current_allocation(&self) -> Decimal;
    fn available_funds(&self) -> Decimal;
    fn equity_curve(&self) -> Vec<(i64, Decimal)>;
    fn return_abs(&self) -> Decimal;
    fn return_perc(&self) -> f64;
    fn drawdown(&self) -> f64;
}

/// The user-supplied strategy: a capability set over an opaque,
/// single-owner state value, modeled as a record of function values
/// rather than inheritance.
///
/// Every fallible callback takes the current state *by reference* and
/// returns the next one on success (`state_{n+1} = callback(state_n,
/// event)`), rather than consuming and returning it. This is what makes
/// "on error, the last good state is retained" structural rather than a
/// convention the processor has to trust the strategy to honor: the old
/// state is simply still there, untouched, when the callback returns
/// `Err`.
#[async_trait]
pub trait Strategy: Send + Sync {
    type State: Send + 'static;

    /// Replays one historical candle through the strategy during seeding.
    /// Infallible: seeding failures originate from the fetcher, not from
    /// the strategy.
    async fn on_seed_candle(&self, state: &Self::State, candle: &Candle) -> Self::State;

    /// Invoked when a candle closes.
    async fn on_candle(&self, state: &Self::State, candle: &Candle) -> Result<Self::State>;

    async fn on_trade(&self, state: &Self::State, trade: &Trade) -> Result<Self::State>;

    async fn on_order(&self, state: &Self::State, event: &OrderCloseEvent) -> Result<Self::State>;

    /// Optional terminal hook, invoked on shutdown. `None` means the
    /// strategy declines to participate and the current state is kept
    /// as-is.
    async fn on_end(&self, _state: &Self::State) -> Option<Self::State> {
        None
    }

    /// Folds leverage, stop-order, and instrument-identity configuration
    /// into the initial state, once, before seeding begins. Strategies
    /// that have no use for these fields can leave the default no-op.
    fn apply_passthrough_config(
        &self,
        state: Self::State,
        _config: &crate::config::PassthroughConfig,
    ) -> Self::State {
        state
    }

    fn get_position(&self, state: &Self::State, symbol: &str) -> Option<OpenPosition>;

    async fn close_open_positions(&self, state: &Self::State) -> Result<Self::State>;

    fn calc_realized_pnl(
        &self,
        state: &Self::State,
        position: &OpenPosition,
        price: Decimal,
    ) -> Decimal;

    fn calc_unrealized_pnl(
        &self,
        state: &Self::State,
        position: &OpenPosition,
        price: Decimal,
    ) -> Decimal;
}
