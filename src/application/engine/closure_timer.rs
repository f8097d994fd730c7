//! Closure Timer.
//!
//! A watchdog against an exchange that stops emitting candle updates
//! mid-bar: if no update has moved the last candle forward within 1.5x
//! the timeframe width, the processor synthesizes a close at the last
//! known price and carries on. Re-arming bumps an epoch counter so a
//! timer fired from a stale arm (one superseded by a newer candle
//! arriving before it fired) is recognized and ignored rather than acted
//! on twice.

use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::application::engine::processor::EngineCommand;

/// Spawns a one-shot delayed send of `WatchdogFire`. The processor
/// compares the returned `epoch` against its current one on receipt and
/// drops anything stale.
pub fn arm<S: Send + 'static>(
    tx: mpsc::UnboundedSender<EngineCommand<S>>,
    epoch: u64,
    expected_mts: i64,
    delay_ms: i64,
) {
    let delay = Duration::from_millis(delay_ms.max(0) as u64);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let _ = tx.send(EngineCommand::WatchdogFire {
            epoch,
            expected_mts,
            now_ms,
        });
    });
}
