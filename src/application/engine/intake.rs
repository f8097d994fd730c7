//! Event Intake.
//!
//! Normalizes raw `WsEvent`s into `QueueMessage`s and enqueues them on the
//! Serial Processor's command channel. Runs on whatever task the
//! `WsManager` delivers events from — it never touches engine state
//! itself, only sends commands, so it can run concurrently with the
//! processor without synchronization.

use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, warn};

use crate::application::engine::processor::EngineCommand;
use crate::domain::ports::{SocketLifecycle, Strategy, WsEvent};
use crate::domain::types::QueueMessage;

pub struct IntakeContext<Strat: Strategy> {
    pub symbol: String,
    pub timeframe: crate::domain::timeframe::Timeframe,
    pub include_trades: bool,
    pub cmd_tx: tokio_mpsc::UnboundedSender<EngineCommand<Strat::State>>,
}

/// Drains one raw channel of `WsEvent`s, translating and forwarding each
/// to the processor's command channel. Spawned once per subscription.
pub async fn run_candle_intake<Strat: Strategy>(
    mut rx: tokio_mpsc::Receiver<WsEvent>,
    ctx: std::sync::Arc<IntakeContext<Strat>>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            WsEvent::CandleSnapshot(snapshot) if snapshot.len() > 1 => {
                debug!("dropping candle snapshot, seeding owns history");
            }
            WsEvent::CandleSnapshot(mut snapshot) => {
                if let Some(mut candle) = snapshot.pop() {
                    candle.symbol = ctx.symbol.clone();
                    candle.tf = ctx.timeframe;
                    send(&ctx, QueueMessage::Candle(candle));
                }
            }
            WsEvent::CandleSingle(mut candle) => {
                candle.symbol = ctx.symbol.clone();
                candle.tf = ctx.timeframe;
                send(&ctx, QueueMessage::Candle(candle));
            }
            other => {
                warn!(?other, "unexpected event on candle channel, dropped");
            }
        }
    }
}

pub async fn run_trade_intake<Strat: Strategy>(
    mut rx: tokio_mpsc::Receiver<WsEvent>,
    ctx: std::sync::Arc<IntakeContext<Strat>>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            WsEvent::TradeSnapshot(_) => {
                debug!("dropping trade snapshot");
            }
            WsEvent::TradeSingle(trade) => {
                if ctx.include_trades {
                    send(&ctx, QueueMessage::Trade(trade));
                }
            }
            WsEvent::TradePrice(trade) => {
                // Forwarded to the processor rather than pushed to the
                // price feed here, so the monotonic watermark stays
                // single-writer.
                if ctx.cmd_tx.send(EngineCommand::TradePriceTick(trade)).is_err() {
                    debug!("processor channel closed, dropping trade price tick");
                }
            }
            other => {
                warn!(?other, "unexpected event on trade channel, dropped");
            }
        }
    }
}

pub async fn run_auth_intake<Strat: Strategy>(
    mut rx: tokio_mpsc::Receiver<WsEvent>,
    ctx: std::sync::Arc<IntakeContext<Strat>>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            WsEvent::OrderClose(evt) => send(&ctx, QueueMessage::OrderClose(evt)),
            WsEvent::WalletSnapshot(wallets) => send(&ctx, QueueMessage::WalletSnapshot(wallets)),
            WsEvent::WalletUpdate(update) => send(&ctx, QueueMessage::WalletUpdate(update)),
            other => {
                warn!(?other, "unexpected event on auth channel, dropped");
            }
        }
    }
}

/// Forwards perf-manager update ticks into `EngineCommand::PerfTick`.
/// One task per engine instance, spawned alongside the other intake
/// tasks.
pub async fn run_perf_intake<Strat: Strategy>(
    mut rx: tokio::sync::broadcast::Receiver<crate::domain::ports::PerfUpdate>,
    cmd_tx: tokio_mpsc::UnboundedSender<EngineCommand<Strat::State>>,
) {
    loop {
        match rx.recv().await {
            Ok(update) => {
                let _ = cmd_tx.send(EngineCommand::PerfTick { price: update.price });
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "perf manager update receiver lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub async fn run_lifecycle_intake<Strat: Strategy>(
    mut rx: tokio::sync::broadcast::Receiver<SocketLifecycle>,
    cmd_tx: tokio_mpsc::UnboundedSender<EngineCommand<Strat::State>>,
) {
    loop {
        match rx.recv().await {
            Ok(SocketLifecycle::Open) => {
                let _ = cmd_tx.send(EngineCommand::SocketOpen);
            }
            Ok(SocketLifecycle::Close) => {
                let _ = cmd_tx.send(EngineCommand::SocketClose);
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "socket lifecycle receiver lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn send<Strat: Strategy>(ctx: &IntakeContext<Strat>, msg: QueueMessage) {
    if ctx.cmd_tx.send(EngineCommand::Enqueue(msg)).is_err() {
        debug!("processor channel closed, dropping intake message");
    }
}
