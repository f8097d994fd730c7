//! Throttled Fetcher.
//!
//! A rate-limited wrapper over the injected `RestClient`: a global token
//! bucket of 10 requests per 60 seconds, shared across the whole engine.
//! Excess calls queue on the limiter rather than failing; failures from
//! the underlying client surface unchanged, with no automatic retry.

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::Result;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::domain::ports::{HistoryQuery, RestClient};
use crate::domain::timeframe::Timeframe;
use crate::domain::types::Candle;

type Limiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub struct ThrottledFetcher {
    client: Arc<dyn RestClient>,
    limiter: Limiter,
}

impl ThrottledFetcher {
    /// 10 requests per 60 seconds, the global quota for the whole engine.
    pub fn new(client: Arc<dyn RestClient>) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(10).expect("10 is nonzero"));
        Self {
            client,
            limiter: RateLimiter::direct(quota),
        }
    }

    pub async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        query: HistoryQuery,
    ) -> Result<Vec<Candle>> {
        self.limiter.until_ready().await;
        debug!(symbol, tf = %timeframe, start = query.start, end = query.end, "fetching candles");
        self.client.candles(symbol, timeframe, query).await
    }
}
