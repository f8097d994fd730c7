//! Candle Padder.
//!
//! Fills gaps in a historical candle series with synthetic zero-volume
//! candles carrying the previous close, so downstream consumers always
//! see a dense, `width`-aligned series.

use crate::domain::timeframe::Timeframe;
use crate::domain::types::Candle;

/// Pads `candles` to a dense series over `[start, end)` in steps of
/// `width_ms`. Real candles always win over synthetic ones at the same
/// `mts`. Head gaps (before the first real candle) back-project from the
/// first real candle's close.
///
/// Guarantees: `result.len() == (end - start) / width_ms` when `start`
/// and `end` are `width_ms`-aligned, and every `result[k].mts == start +
/// k * width_ms`.
pub fn pad(
    candles: &[Candle],
    symbol: &str,
    tf: Timeframe,
    width_ms: i64,
    start: i64,
    end: i64,
) -> Vec<Candle> {
    let mut by_mts: std::collections::HashMap<i64, Candle> =
        candles.iter().cloned().map(|c| (c.mts, c)).collect();

    let first_real_close = candles.iter().min_by_key(|c| c.mts).map(|c| c.close);

    let bucket_count = ((end - start) / width_ms).max(0) as usize;
    let mut out = Vec::with_capacity(bucket_count);
    let mut prev_close = None;

    for k in 0..bucket_count {
        let mts = start + k as i64 * width_ms;
        if let Some(real) = by_mts.remove(&mts) {
            prev_close = Some(real.close);
            out.push(real);
        } else {
            let close = prev_close
                .or(first_real_close)
                .unwrap_or(rust_decimal::Decimal::ZERO);
            out.push(Candle::synthetic(symbol, tf, mts, close));
            prev_close = Some(close);
        }
    }

    out
}
