//! Pause/Resume Controller.
//!
//! A socket close pauses processing in place: the queue keeps accepting
//! enqueues (only `stopped` discards them), but draining stops until the
//! socket reopens. On reopen, the controller backfills the gap between
//! pause and resume (plus a fixed look-back) via the throttled fetcher,
//! pads it, prepends the padded run ahead of whatever queued up live
//! during the outage, stable-sorts the combined run by `mts`, then
//! resumes draining and re-arms the closure watchdog.

use tracing::{info, warn};

use crate::application::engine::padder;
use crate::application::engine::processor::SerialProcessor;
use crate::domain::errors::EngineError;
use crate::domain::ports::{HistoryQuery, Strategy};
use crate::domain::timeframe::align_down;
use crate::domain::types::QueueMessage;

/// Fixed look-back window for pause-gap backfill: 2 minutes, independent
/// of timeframe width. Covers clock skew and boundary candles regardless
/// of whether the bar width is 1m or 1D.
const BACKFILL_LOOKBACK_MS: i64 = 120_000;

pub fn on_socket_close<Strat: Strategy>(processor: &mut SerialProcessor<Strat>, now_ms: i64) {
    let state = processor.engine_state_mut();
    if state.paused || state.stopped {
        return;
    }
    state.paused = true;
    state.paused_on = Some(now_ms);
    state.metrics.pauses += 1;
    warn!(now_ms, pauses = state.metrics.pauses, "socket closed, pausing processing");
}

pub async fn on_socket_open<Strat: Strategy>(processor: &mut SerialProcessor<Strat>, now_ms: i64) {
    let paused_on = {
        let state = processor.engine_state_mut();
        if state.stopped {
            return;
        }
        if !state.paused {
            // No outage to backfill; nothing to do.
            return;
        }
        state.resumed_on = Some(now_ms);
        state.paused_on
    };

    let Some(paused_on) = paused_on else {
        clear_pause(processor);
        return;
    };

    let symbol = processor.symbol().to_string();
    let tf = processor.timeframe();
    let width = tf.width_ms();
    let backfill_start = align_down(paused_on - BACKFILL_LOOKBACK_MS, width);
    let backfill_end = align_down(now_ms, width).max(backfill_start);

    let fetched = processor
        .fetcher()
        .fetch_candles(
            &symbol,
            tf,
            HistoryQuery {
                start: backfill_start,
                end: backfill_end,
                limit: 1000,
                sort: 1,
            },
        )
        .await;

    match fetched {
        Ok(candles) => {
            let padded = padder::pad(&candles, &symbol, tf, width, backfill_start, backfill_end);
            let batch: Vec<QueueMessage> = padded.into_iter().map(QueueMessage::Candle).collect();
            processor.enqueue_front_batch(batch);
            processor.stable_sort_queue(now_ms);
            info!(
                symbol,
                start = backfill_start,
                end = backfill_end,
                "backfilled pause gap"
            );
        }
        Err(source) => {
            let err = EngineError::PauseResumeFetch {
                symbol: symbol.clone(),
                source,
            };
            warn!(error = %err, "pause gap backfill failed, resuming without it");
            processor.emit_error(err.to_string());
        }
    }

    clear_pause(processor);
    processor.rearm_watchdog(now_ms);
    processor.drain(now_ms).await;
}

fn clear_pause<Strat: Strategy>(processor: &mut SerialProcessor<Strat>) {
    let state = processor.engine_state_mut();
    state.paused = false;
    state.paused_on = None;
    state.resumed_on = None;
}
