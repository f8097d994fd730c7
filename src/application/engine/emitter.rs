//! Results Emitter.
//!
//! After every processed queue message the processor calls `emit`, which
//! assembles an `OpenedPositionData` (if a position is open and a price
//! is known) and a full `RtExecutionResults` snapshot, and broadcasts
//! both. Receivers with no active listener simply miss the tick, rather
//! than buffering for slow consumers.

use tokio::sync::broadcast;

use crate::application::engine::processor::EngineState;
use crate::config::CandlePriceField;
use crate::domain::events::{EngineEvent, OpenedPositionData, ResultsSnapshot};
use crate::domain::ports::{PerfManager, Strategy};
use rust_decimal::Decimal;

#[allow(clippy::too_many_arguments)]
pub fn emit<Strat: Strategy>(
    strategy: &Strat,
    state: &Strat::State,
    symbol: &str,
    engine_state: &EngineState,
    perf_manager: &dyn PerfManager,
    tick_price: Option<Decimal>,
    candle_price: CandlePriceField,
    events_tx: &broadcast::Sender<EngineEvent>,
) {
    let price = tick_price.or_else(|| engine_state.last_candle.as_ref().map(|c| candle_price.select(c)));
    let position = strategy.get_position(state, symbol);

    let (realized, unrealized) = match (&position, price) {
        (Some(pos), Some(p)) => (
            strategy.calc_realized_pnl(state, pos, p),
            strategy.calc_unrealized_pnl(state, pos, p),
        ),
        _ => (Decimal::ZERO, Decimal::ZERO),
    };

    if let Some(pos) = &position {
        let _ = events_tx.send(EngineEvent::OpenedPositionData(OpenedPositionData {
            position: pos.clone(),
            realized_pnl: realized,
            unrealized_pnl: unrealized,
        }));
    }

    let snapshot = ResultsSnapshot {
        last_candle: engine_state.last_candle.clone(),
        last_trade: engine_state.last_trade.clone(),
        price,
        open_position: position,
        realized_pnl: realized,
        unrealized_pnl: unrealized,
        equity_curve: perf_manager.equity_curve(),
        return_abs: perf_manager.return_abs(),
        return_perc: perf_manager.return_perc(),
        drawdown: perf_manager.drawdown(),
    };
    let _ = events_tx.send(EngineEvent::RtExecutionResults(snapshot));
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::domain::ports::PerfUpdate;
    use crate::domain::timeframe::Timeframe;
    use crate::domain::types::{Candle, OpenPosition, OrderCloseEvent, Trade};

    struct FixedPerf;
    impl PerfManager for FixedPerf {
        fn subscribe_updates(&self) -> broadcast::Receiver<PerfUpdate> {
            broadcast::channel(1).1
        }
        fn allocation(&self) -> Decimal {
            dec!(1)
        }
        fn position_size(&self) -> Decimal {
            dec!(1)
        }
        fn current_allocation(&self) -> Decimal {
            dec!(1)
        }
        fn available_funds(&self) -> Decimal {
            dec!(1000)
        }
        fn equity_curve(&self) -> Vec<(i64, Decimal)> {
            vec![(0, dec!(1000))]
        }
        fn return_abs(&self) -> Decimal {
            dec!(0)
        }
        fn return_perc(&self) -> f64 {
            0.0
        }
        fn drawdown(&self) -> f64 {
            0.0
        }
    }

    struct LongOnlyStrategy;
    #[async_trait]
    impl Strategy for LongOnlyStrategy {
        type State = ();

        async fn on_seed_candle(&self, state: &Self::State, _candle: &Candle) -> Self::State {
            state.clone()
        }
        async fn on_candle(&self, state: &Self::State, _candle: &Candle) -> anyhow::Result<Self::State> {
            Ok(state.clone())
        }
        async fn on_trade(&self, state: &Self::State, _trade: &Trade) -> anyhow::Result<Self::State> {
            Ok(state.clone())
        }
        async fn on_order(
            &self,
            state: &Self::State,
            _event: &OrderCloseEvent,
        ) -> anyhow::Result<Self::State> {
            Ok(state.clone())
        }
        fn get_position(&self, _state: &Self::State, symbol: &str) -> Option<OpenPosition> {
            Some(OpenPosition {
                symbol: symbol.to_string(),
                quantity: dec!(2),
                entry_price: dec!(100),
            })
        }
        async fn close_open_positions(&self, state: &Self::State) -> anyhow::Result<Self::State> {
            Ok(state.clone())
        }
        fn calc_realized_pnl(&self, _: &Self::State, _: &OpenPosition, _: Decimal) -> Decimal {
            dec!(0)
        }
        fn calc_unrealized_pnl(
            &self,
            _: &Self::State,
            pos: &OpenPosition,
            price: Decimal,
        ) -> Decimal {
            (price - pos.entry_price) * pos.quantity
        }
    }

    #[test]
    fn emits_opened_position_data_when_position_and_price_known() {
        let strategy = LongOnlyStrategy;
        let mut engine_state = EngineState::fresh();
        engine_state.last_candle = Some(Candle::synthetic("tBTCUSD", Timeframe::OneMin, 0, dec!(110)));
        let perf = FixedPerf;
        let (tx, mut rx) = broadcast::channel(8);

        emit(
            &strategy,
            &(),
            "tBTCUSD",
            &engine_state,
            &perf,
            None,
            CandlePriceField::Close,
            &tx,
        );

        let mut saw_position = false;
        let mut saw_results = false;
        while let Ok(evt) = rx.try_recv() {
            match evt {
                EngineEvent::OpenedPositionData(d) => {
                    assert_eq!(d.unrealized_pnl, dec!(20));
                    saw_position = true;
                }
                EngineEvent::RtExecutionResults(r) => {
                    assert_eq!(r.price, Some(dec!(110)));
                    saw_results = true;
                }
                EngineEvent::Error(_) => panic!("unexpected error event"),
            }
        }
        assert!(saw_position && saw_results);
    }
}
