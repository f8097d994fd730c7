//! Seeder.
//!
//! Pages through history to warm the strategy's indicators before live
//! processing begins. Runs to completion before any live subscription is
//! opened; a fetch failure here is fatal to `execute`.

use anyhow::Context;
use tracing::info;

use crate::application::engine::fetcher::ThrottledFetcher;
use crate::domain::errors::EngineError;
use crate::domain::ports::{HistoryQuery, Strategy};
use crate::domain::timeframe::{align_down, Timeframe};
use crate::domain::types::Candle;

const MAX_PAGE_SIZE: i64 = 1000;

/// Result of a seeding run: the strategy state after replaying history,
/// and the last candle observed (to initialize the processor's last-candle
/// watermark for live processing).
pub struct SeedResult<S> {
    pub state: S,
    pub last_candle: Option<Candle>,
}

/// Seeds `strategy` with `seed_count` historical candles ending at the
/// timeframe-aligned bucket at or before `now_ms`.
pub async fn seed<Strat>(
    fetcher: &ThrottledFetcher,
    strategy: &Strat,
    mut state: Strat::State,
    symbol: &str,
    timeframe: Timeframe,
    seed_count: u32,
    now_ms: i64,
) -> anyhow::Result<SeedResult<Strat::State>>
where
    Strat: Strategy,
{
    let width = timeframe.width_ms();
    let aligned_end = align_down(now_ms, width);
    let seed_start = aligned_end - (seed_count as i64) * width;

    let mut last_candle: Option<Candle> = None;
    let mut cursor = seed_start;

    while cursor < aligned_end {
        let page_end = (cursor + MAX_PAGE_SIZE * width).min(aligned_end);

        let mut candles = fetcher
            .fetch_candles(
                symbol,
                timeframe,
                HistoryQuery {
                    start: cursor,
                    end: page_end,
                    limit: MAX_PAGE_SIZE as usize,
                    sort: 1,
                },
            )
            .await
            .map_err(|source| EngineError::SeedFetch {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                source,
            })
            .context("seeding aborted")?;

        candles.sort_by_key(|c| c.mts);

        for mut candle in candles {
            let is_newer = last_candle.as_ref().map(|lc| candle.mts > lc.mts).unwrap_or(true);
            if !is_newer {
                continue;
            }
            candle.symbol = symbol.to_string();
            candle.tf = timeframe;
            state = strategy.on_seed_candle(&state, &candle).await;
            last_candle = Some(candle);
        }

        cursor = page_end;
    }

    info!(
        symbol,
        tf = %timeframe,
        seeded_through = ?last_candle.as_ref().map(|c| c.mts),
        "seeding complete"
    );

    Ok(SeedResult { state, last_candle })
}
