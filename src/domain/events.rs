use rust_decimal::Decimal;

use crate::domain::types::{Candle, OpenPosition, Trade};

/// Opened-position PnL snapshot, emitted whenever both a current price
/// and an open position are available.
#[derive(Debug, Clone)]
pub struct OpenedPositionData {
    pub position: OpenPosition,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Full results snapshot, emitted after every processed event. Intentionally
/// a plain summary struct rather than a reimplementation of the performance
/// manager's internals — the heavier statistics (Sharpe, drawdown curves,
/// etc.) live behind `PerfManager` and are copied in verbatim.
#[derive(Debug, Clone)]
pub struct ResultsSnapshot {
    pub last_candle: Option<Candle>,
    pub last_trade: Option<Trade>,
    pub price: Option<Decimal>,
    pub open_position: Option<OpenPosition>,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub equity_curve: Vec<(i64, Decimal)>,
    pub return_abs: Decimal,
    pub return_perc: f64,
    pub drawdown: f64,
}

/// Events broadcast to observers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Error(String),
    OpenedPositionData(OpenedPositionData),
    RtExecutionResults(ResultsSnapshot),
}
