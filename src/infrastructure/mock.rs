//! In-memory collaborators implementing the port traits, so the engine is
//! runnable and testable without a live exchange connection: an
//! `RwLock`-guarded shared state, a background `tokio::spawn` price
//! simulator, and `broadcast` fan-out to subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::info;

use crate::domain::ports::{
    HistoryQuery, PerfManager, PerfUpdate, PriceFeed, RestClient, SocketLifecycle, WsEvent,
    WsManager,
};
use crate::domain::timeframe::Timeframe;
use crate::domain::types::Candle;

/// Deterministic synthetic candle history: a flat series at a fixed
/// price, one bucket per `timeframe.width_ms()` step. Enough to exercise
/// seeding and padding without depending on wall-clock jitter.
pub struct MockRestClient {
    pub base_price: Decimal,
}

impl MockRestClient {
    pub fn new(base_price: Decimal) -> Self {
        Self { base_price }
    }
}

impl Default for MockRestClient {
    fn default() -> Self {
        Self::new(dec!(100))
    }
}

#[async_trait]
impl RestClient for MockRestClient {
    async fn candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        query: HistoryQuery,
    ) -> Result<Vec<Candle>> {
        let width = timeframe.width_ms();
        let mut out = Vec::new();
        let mut mts = query.start;
        while mts < query.end && out.len() < query.limit {
            out.push(Candle::synthetic(symbol, timeframe, mts, self.base_price));
            mts += width;
        }
        Ok(out)
    }
}

/// Simulated WS manager: on `subscribe_candles`, spawns a task that
/// drips one synthetic candle every `tick` and periodically "closes" it
/// by moving to the next bucket, so downstream consumers see both the
/// update-in-place and the update-then-close transitions the processor
/// dispatches on.
pub struct MockWsManager {
    tick: Duration,
    lifecycle_tx: broadcast::Sender<SocketLifecycle>,
}

impl MockWsManager {
    pub fn new(tick: Duration) -> Self {
        let (lifecycle_tx, _) = broadcast::channel(16);
        Self { tick, lifecycle_tx }
    }

    /// Simulates a socket drop followed by a reconnect, for exercising
    /// the pause/resume controller interactively.
    pub fn simulate_reconnect(&self) {
        let tx = self.lifecycle_tx.clone();
        let _ = tx.send(SocketLifecycle::Close);
        let _ = tx.send(SocketLifecycle::Open);
    }
}

impl Default for MockWsManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl WsManager for MockWsManager {
    async fn subscribe_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<mpsc::Receiver<WsEvent>> {
        let (tx, rx) = mpsc::channel(64);
        let symbol = symbol.to_string();
        let width = timeframe.width_ms();
        let tick = self.tick;
        tokio::spawn(async move {
            let mut mts = 0i64;
            let mut price = dec!(100);
            loop {
                tokio::time::sleep(tick).await;
                price += dec!(0.01);
                let candle = Candle::synthetic(&symbol, timeframe, mts, price);
                if tx.send(WsEvent::CandleSingle(candle)).await.is_err() {
                    break;
                }
                mts += width;
            }
        });
        info!(symbol, tf = %timeframe, "mock candle feed started");
        Ok(rx)
    }

    async fn subscribe_trades(&self, _symbol: &str) -> Result<mpsc::Receiver<WsEvent>> {
        let (_tx, rx) = mpsc::channel(8);
        Ok(rx)
    }

    async fn subscribe_auth(&self) -> Result<mpsc::Receiver<WsEvent>> {
        let (_tx, rx) = mpsc::channel(8);
        Ok(rx)
    }

    async fn subscribe_socket_lifecycle(&self) -> Result<broadcast::Receiver<SocketLifecycle>> {
        Ok(self.lifecycle_tx.subscribe())
    }
}

/// Stores the latest monotonic price update, guarded by an `RwLock`.
pub struct MockPriceFeed {
    last: RwLock<HashMap<i64, Decimal>>,
}

impl MockPriceFeed {
    pub fn new() -> Self {
        Self {
            last: RwLock::new(HashMap::new()),
        }
    }

    pub async fn latest(&self) -> Option<(i64, Decimal)> {
        self.last.read().await.iter().map(|(k, v)| (*k, *v)).max_by_key(|(mts, _)| *mts)
    }
}

impl Default for MockPriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceFeed for MockPriceFeed {
    async fn update(&self, price: Decimal, mts: i64) {
        self.last.write().await.insert(mts, price);
    }
}

/// Fixed-allocation performance manager reporting a flat equity curve.
/// Enough surface for the result emitter to exercise its accessor calls
/// without a real portfolio behind it.
pub struct MockPerfManager {
    updates_tx: broadcast::Sender<PerfUpdate>,
    starting_equity: Decimal,
}

impl MockPerfManager {
    pub fn new(starting_equity: Decimal) -> Self {
        let (updates_tx, _) = broadcast::channel(64);
        Self {
            updates_tx,
            starting_equity,
        }
    }

    pub fn publish(&self, mts: i64, price: Decimal) {
        let _ = self.updates_tx.send(PerfUpdate { mts, price });
    }
}

impl Default for MockPerfManager {
    fn default() -> Self {
        Self::new(dec!(10000))
    }
}

impl PerfManager for MockPerfManager {
    fn subscribe_updates(&self) -> broadcast::Receiver<PerfUpdate> {
        self.updates_tx.subscribe()
    }
    fn allocation(&self) -> Decimal {
        dec!(1)
    }
    fn position_size(&self) -> Decimal {
        dec!(0)
    }
    fn current_allocation(&self) -> Decimal {
        dec!(0)
    }
    fn available_funds(&self) -> Decimal {
        self.starting_equity
    }
    fn equity_curve(&self) -> Vec<(i64, Decimal)> {
        vec![(0, self.starting_equity)]
    }
    fn return_abs(&self) -> Decimal {
        Decimal::ZERO
    }
    fn return_perc(&self) -> f64 {
        0.0
    }
    fn drawdown(&self) -> f64 {
        0.0
    }
}

pub fn mock_rest_client() -> Arc<dyn RestClient> {
    Arc::new(MockRestClient::default())
}

pub fn mock_ws_manager() -> Arc<dyn WsManager> {
    Arc::new(MockWsManager::default())
}

pub fn mock_price_feed() -> Arc<dyn PriceFeed> {
    Arc::new(MockPriceFeed::default())
}

pub fn mock_perf_manager() -> Arc<dyn PerfManager> {
    Arc::new(MockPerfManager::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rest_client_returns_ascending_padded_candles() {
        let client = MockRestClient::new(dec!(50));
        let candles = client
            .candles(
                "tBTCUSD",
                Timeframe::OneMin,
                HistoryQuery {
                    start: 0,
                    end: 180_000,
                    limit: 1000,
                    sort: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].mts, 0);
        assert_eq!(candles[2].mts, 120_000);
    }

    #[tokio::test]
    async fn price_feed_tracks_latest_by_mts() {
        let feed = MockPriceFeed::new();
        feed.update(dec!(1), 0).await;
        feed.update(dec!(2), 60_000).await;
        assert_eq!(feed.latest().await, Some((60_000, dec!(2))));
    }

    #[tokio::test]
    async fn ws_manager_lifecycle_simulates_reconnect() {
        let manager = MockWsManager::default();
        let mut rx = manager.subscribe_socket_lifecycle().await.unwrap();
        manager.simulate_reconnect();
        assert_eq!(rx.recv().await.unwrap(), SocketLifecycle::Close);
        assert_eq!(rx.recv().await.unwrap(), SocketLifecycle::Open);
    }
}
