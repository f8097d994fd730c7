//! Concrete scenario tests (spec.md §8's six scenarios), driven directly
//! against `SerialProcessor` and the pause/resume functions rather than
//! the full `Engine::execute` wiring — the same component-level style as
//! the teacher's own `tests/scenarios/` integration tests.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, mpsc};

use strategy_exec::application::engine::fetcher::ThrottledFetcher;
use strategy_exec::application::engine::pause_resume;
use strategy_exec::application::engine::processor::{EngineCommand, SerialProcessor};
use strategy_exec::config::CandlePriceField;
use strategy_exec::domain::events::EngineEvent;
use strategy_exec::domain::ports::HistoryQuery;
use strategy_exec::domain::ports::{PerfManager, PriceFeed, RestClient, Strategy};
use strategy_exec::domain::timeframe::{align_down, Timeframe};
use strategy_exec::domain::types::{
    Candle, OpenPosition, OrderCloseEvent, QueueMessage, Trade, Wallet, WalletUpdate,
};
use strategy_exec::infrastructure::mock::{MockPerfManager, MockPriceFeed, MockRestClient};

#[derive(Default)]
struct Recorder {
    on_candle: Vec<Candle>,
    on_trade: Vec<i64>,
}

struct RecordingStrategy {
    recorder: Arc<Mutex<Recorder>>,
}

#[async_trait]
impl Strategy for RecordingStrategy {
    type State = ();

    async fn on_seed_candle(&self, state: &Self::State, _candle: &Candle) -> Self::State {
        *state
    }

    async fn on_candle(&self, state: &Self::State, candle: &Candle) -> anyhow::Result<Self::State> {
        self.recorder.lock().unwrap().on_candle.push(candle.clone());
        Ok(*state)
    }

    async fn on_trade(&self, state: &Self::State, trade: &Trade) -> anyhow::Result<Self::State> {
        self.recorder.lock().unwrap().on_trade.push(trade.id);
        Ok(*state)
    }

    async fn on_order(
        &self,
        state: &Self::State,
        _event: &OrderCloseEvent,
    ) -> anyhow::Result<Self::State> {
        Ok(*state)
    }

    fn get_position(&self, _state: &Self::State, _symbol: &str) -> Option<OpenPosition> {
        None
    }

    async fn close_open_positions(&self, state: &Self::State) -> anyhow::Result<Self::State> {
        Ok(*state)
    }

    fn calc_realized_pnl(&self, _: &Self::State, _: &OpenPosition, _: Decimal) -> Decimal {
        Decimal::ZERO
    }

    fn calc_unrealized_pnl(&self, _: &Self::State, _: &OpenPosition, _: Decimal) -> Decimal {
        Decimal::ZERO
    }
}

fn build_processor(
    initial_last_candle: Option<Candle>,
) -> (SerialProcessor<RecordingStrategy>, Arc<Mutex<Recorder>>) {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let strategy = Arc::new(RecordingStrategy {
        recorder: recorder.clone(),
    });
    let price_feed: Arc<dyn PriceFeed> = Arc::new(MockPriceFeed::new());
    let perf_manager: Arc<dyn PerfManager> = Arc::new(MockPerfManager::new(dec!(10000)));
    let rest_client: Arc<dyn RestClient> = Arc::new(MockRestClient::new(dec!(100)));
    let fetcher = Arc::new(ThrottledFetcher::new(rest_client));
    let (events_tx, _) = broadcast::channel::<EngineEvent>(64);
    let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel::<EngineCommand<()>>();

    let processor = SerialProcessor::new(
        strategy,
        (),
        price_feed,
        perf_manager,
        fetcher,
        events_tx,
        cmd_tx,
        "tBTCUSD".to_string(),
        Timeframe::OneMin,
        CandlePriceField::Close,
        initial_last_candle,
        Arc::new(AtomicBool::new(false)),
    );
    (processor, recorder)
}

#[tokio::test]
async fn scenario_1_happy_path_close_then_watchdog() {
    let seeded_last = Candle::synthetic("tBTCUSD", Timeframe::OneMin, 120_000, dec!(50));
    let (mut processor, recorder) = build_processor(Some(seeded_last));

    let live = Candle::synthetic("tBTCUSD", Timeframe::OneMin, 180_000, dec!(55));
    processor.enqueue_front_batch(vec![QueueMessage::Candle(live)]);
    processor.drain(180_000).await;

    {
        let rec = recorder.lock().unwrap();
        assert_eq!(rec.on_candle.len(), 1);
        assert_eq!(rec.on_candle[0].mts, 120_000);
    }

    // One live candle has been processed since the processor started, so
    // exactly one watchdog rearm has happened: epoch == 1.
    let epoch = processor.engine_state().timer_epoch;
    assert_eq!(epoch, 1);

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(processor.run(cmd_rx));

    cmd_tx
        .send(EngineCommand::WatchdogFire {
            epoch,
            expected_mts: 180_000,
            now_ms: 270_000,
        })
        .unwrap();
    let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
    cmd_tx.send(EngineCommand::Stop { ack: ack_tx }).unwrap();
    ack_rx.await.unwrap();

    let rec = recorder.lock().unwrap();
    assert_eq!(rec.on_candle.len(), 2);
    assert_eq!(rec.on_candle[1].mts, 180_000);
}

#[tokio::test]
async fn scenario_2_gap_during_pause_backfills_in_order() {
    let (mut processor, recorder) = build_processor(None);

    let width = Timeframe::OneMin.width_ms();
    let paused_on = 100_000i64;
    let resumed_on = 400_000i64;

    pause_resume::on_socket_close(&mut processor, paused_on);
    assert!(processor.engine_state().paused);

    pause_resume::on_socket_open(&mut processor, resumed_on).await;
    assert!(!processor.engine_state().paused);

    let expected_start = align_down(paused_on - 120_000, width);
    let expected_end = align_down(resumed_on, width);

    let rec = recorder.lock().unwrap();
    assert!(!rec.on_candle.is_empty());
    // Closed candles are strictly increasing and cover the backfilled
    // range up to (but not including) the still-open final bucket.
    for w in rec.on_candle.windows(2) {
        assert!(w[1].mts > w[0].mts);
    }
    assert_eq!(rec.on_candle[0].mts, expected_start);
    assert_eq!(
        rec.on_candle.last().unwrap().mts,
        expected_end - 2 * width
    );
    drop(rec);

    assert_eq!(
        processor.engine_state().last_candle.as_ref().unwrap().mts,
        expected_end - width
    );

    // A live candle after the backfilled range closes the last backfilled
    // bucket and is itself not yet closed.
    let live = Candle::synthetic("tBTCUSD", Timeframe::OneMin, expected_end, dec!(99));
    processor.enqueue_front_batch(vec![QueueMessage::Candle(live)]);
    processor.drain(expected_end).await;

    let rec = recorder.lock().unwrap();
    assert_eq!(rec.on_candle.last().unwrap().mts, expected_end - width);
}

#[tokio::test]
async fn scenario_3_duplicate_trade_ids_are_deduped() {
    let (mut processor, recorder) = build_processor(None);

    let make = |id: i64| Trade {
        id,
        symbol: "tBTCUSD".to_string(),
        mts: id * 1000,
        price: dec!(1),
        amount: dec!(1),
    };

    processor.enqueue_front_batch(vec![
        QueueMessage::Trade(make(1)),
        QueueMessage::Trade(make(2)),
        QueueMessage::Trade(make(2)),
        QueueMessage::Trade(make(3)),
    ]);
    processor.drain(0).await;

    let rec = recorder.lock().unwrap();
    assert_eq!(rec.on_trade, vec![1, 2, 3]);
}

#[tokio::test]
async fn scenario_4_candle_updates_then_closes_with_final_payload() {
    let (mut processor, recorder) = build_processor(None);

    let update = |close: Decimal| Candle::synthetic("tBTCUSD", Timeframe::OneMin, 60_000, close);

    processor.enqueue_front_batch(vec![
        QueueMessage::Candle(update(dec!(1))),
        QueueMessage::Candle(update(dec!(2))),
        QueueMessage::Candle(update(dec!(3))),
        QueueMessage::Candle(Candle::synthetic(
            "tBTCUSD",
            Timeframe::OneMin,
            120_000,
            dec!(4),
        )),
    ]);
    processor.drain(120_000).await;

    let rec = recorder.lock().unwrap();
    assert_eq!(rec.on_candle.len(), 1);
    assert_eq!(rec.on_candle[0].mts, 60_000);
    assert_eq!(rec.on_candle[0].close, dec!(3));
}

#[tokio::test]
async fn scenario_5_watchdog_closes_stalled_candle() {
    let last = Candle::synthetic("tBTCUSD", Timeframe::OneMin, 60_000, dec!(10));
    let (mut processor, recorder) = build_processor(Some(last));

    // No live candle arrives: the only rearm so far is the one baked into
    // construction via `initial_last_candle`... but `new` does not call
    // `rearm_watchdog` itself, so epoch is still 0 until the watchdog is
    // told to fire directly.
    let epoch = processor.engine_state().timer_epoch;
    assert_eq!(epoch, 0);

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(processor.run(cmd_rx));

    cmd_tx
        .send(EngineCommand::WatchdogFire {
            epoch,
            expected_mts: 60_000,
            now_ms: 150_000,
        })
        .unwrap();
    let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
    cmd_tx.send(EngineCommand::Stop { ack: ack_tx }).unwrap();
    ack_rx.await.unwrap();

    let rec = recorder.lock().unwrap();
    assert_eq!(rec.on_candle.len(), 1);
    assert_eq!(rec.on_candle[0].mts, 60_000);
}

#[tokio::test]
async fn scenario_6_wallet_update_stream_respects_falsy_zero() {
    let (mut processor, _recorder) = build_processor(None);

    processor.enqueue_front_batch(vec![QueueMessage::WalletSnapshot(vec![Wallet {
        currency: "USD".to_string(),
        wallet_type: "exchange".to_string(),
        balance: dec!(100),
        balance_available: dec!(100),
    }])]);
    processor.drain(0).await;

    processor.enqueue_front_batch(vec![QueueMessage::WalletUpdate(WalletUpdate {
        currency: "USD".to_string(),
        wallet_type: "exchange".to_string(),
        balance: Some(dec!(150)),
        balance_available: Some(dec!(150)),
    })]);
    processor.drain(0).await;

    assert_eq!(
        processor.engine_state().wallets,
        vec![Wallet {
            currency: "USD".to_string(),
            wallet_type: "exchange".to_string(),
            balance: dec!(150),
            balance_available: dec!(150),
        }]
    );

    // No matching (currency, type) entry: ignored entirely.
    processor.enqueue_front_batch(vec![QueueMessage::WalletUpdate(WalletUpdate {
        currency: "BTC".to_string(),
        wallet_type: "exchange".to_string(),
        balance: Some(dec!(1)),
        balance_available: Some(dec!(1)),
    })]);
    processor.drain(0).await;

    assert_eq!(processor.engine_state().wallets.len(), 1);
    assert_eq!(processor.engine_state().wallets[0].currency, "USD");
}

// Parameters unused directly but kept to document the intake contract
// this scenario suite exercises at the processor boundary.
#[allow(dead_code)]
fn _assert_history_query_shape(_q: HistoryQuery) {}
