//! CLI entry point. Wires the engine against the in-memory mock
//! collaborators and a minimal demonstration strategy — credential
//! loading, process supervision, and a real exchange connector belong to
//! whatever binary actually trades, not to this library.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

use strategy_exec::config::{EngineConfig, PassthroughConfig};
use strategy_exec::domain::events::EngineEvent;
use strategy_exec::domain::ports::Strategy;
use strategy_exec::domain::timeframe::Timeframe;
use strategy_exec::domain::types::{Candle, OpenPosition, OrderCloseEvent, Trade};
use strategy_exec::infrastructure::mock;

#[derive(Parser, Debug)]
#[command(name = "run_engine", about = "Run the live strategy execution engine")]
struct Cli {
    #[arg(long, env = "ENGINE_SYMBOL", default_value = "tBTCUSD")]
    symbol: String,

    #[arg(long, env = "ENGINE_TIMEFRAME", default_value = "1m")]
    timeframe: String,

    #[arg(long, env = "ENGINE_SEED_CANDLE_COUNT", default_value_t = 50)]
    seed_candle_count: u32,

    #[arg(long, env = "ENGINE_INCLUDE_TRADES", default_value_t = false)]
    include_trades: bool,

    /// Forwarded into the strategy state via `apply_passthrough_config`,
    /// never interpreted by the engine itself.
    #[arg(long, env = "ENGINE_LEVERAGE")]
    leverage: Option<Decimal>,

    /// Seconds to run before calling stop_execution. 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 10)]
    run_seconds: u64,
}

/// Counts candle closes; never opens a position. Stands in for the
/// strategy the engine is built to drive — the strategy itself is a
/// collaborator, not part of this library.
#[derive(Debug, Default, Clone)]
struct DemoState {
    candles_seen: u64,
    leverage: Option<Decimal>,
}

struct DemoStrategy;

#[async_trait]
impl Strategy for DemoStrategy {
    type State = DemoState;

    async fn on_seed_candle(&self, state: &Self::State, _candle: &Candle) -> Self::State {
        DemoState {
            candles_seen: state.candles_seen + 1,
            ..state.clone()
        }
    }

    async fn on_candle(&self, state: &Self::State, candle: &Candle) -> Result<Self::State> {
        info!(mts = candle.mts, close = %candle.close, "candle closed");
        Ok(DemoState {
            candles_seen: state.candles_seen + 1,
            ..state.clone()
        })
    }

    async fn on_trade(&self, state: &Self::State, _trade: &Trade) -> Result<Self::State> {
        Ok(state.clone())
    }

    async fn on_order(&self, state: &Self::State, _event: &OrderCloseEvent) -> Result<Self::State> {
        Ok(state.clone())
    }

    fn apply_passthrough_config(&self, state: Self::State, config: &PassthroughConfig) -> Self::State {
        DemoState {
            leverage: config.leverage,
            ..state
        }
    }

    fn get_position(&self, _state: &Self::State, _symbol: &str) -> Option<OpenPosition> {
        None
    }

    async fn close_open_positions(&self, state: &Self::State) -> Result<Self::State> {
        Ok(state.clone())
    }

    fn calc_realized_pnl(&self, _: &Self::State, _: &OpenPosition, _: Decimal) -> Decimal {
        Decimal::ZERO
    }

    fn calc_unrealized_pnl(&self, _: &Self::State, _: &OpenPosition, _: Decimal) -> Decimal {
        Decimal::ZERO
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    info!(?cli, "starting engine");

    let timeframe: Timeframe = cli.timeframe.parse()?;
    let config = EngineConfig::builder(cli.symbol, timeframe)
        .include_trades(cli.include_trades)
        .seed_candle_count(cli.seed_candle_count)
        .passthrough(PassthroughConfig {
            leverage: cli.leverage,
            ..Default::default()
        })
        .build();

    let strategy = Arc::new(DemoStrategy);
    let rest_client = mock::mock_rest_client();
    let ws_manager = mock::mock_ws_manager();
    let price_feed = mock::mock_price_feed();
    let perf_manager = mock::mock_perf_manager();

    let engine = strategy_exec::application::engine::Engine::execute(
        config,
        strategy,
        DemoState::default(),
        rest_client,
        ws_manager,
        price_feed,
        perf_manager,
    )
    .await?;

    let mut events_rx = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            match event {
                EngineEvent::Error(msg) => tracing::error!(%msg, "engine error"),
                EngineEvent::OpenedPositionData(data) => {
                    info!(symbol = %data.position.symbol, "position update")
                }
                EngineEvent::RtExecutionResults(_) => {}
            }
        }
    });

    if cli.run_seconds == 0 {
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::time::sleep(Duration::from_secs(cli.run_seconds)).await;
    }

    info!("stopping engine");
    engine.stop_execution().await;
    Ok(())
}
