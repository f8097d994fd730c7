//! Engine configuration.
//!
//! `EngineConfig` is built with a fluent builder rather than a struct
//! literal with every optional field spelled out at every call site.
//! `from_env` is only used by the binary entry point — library callers
//! always go through the builder so tests stay hermetic.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use crate::domain::timeframe::Timeframe;
use crate::domain::types::Candle;

/// Which OHLC field feeds the price feed and the results emitter.
/// Defaults to `Close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandlePriceField {
    Open,
    High,
    Low,
    #[default]
    Close,
}

impl CandlePriceField {
    pub fn select(&self, candle: &Candle) -> Decimal {
        match self {
            CandlePriceField::Open => candle.open,
            CandlePriceField::High => candle.high,
            CandlePriceField::Low => candle.low,
            CandlePriceField::Close => candle.close,
        }
    }
}

impl FromStr for CandlePriceField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(CandlePriceField::Open),
            "high" => Ok(CandlePriceField::High),
            "low" => Ok(CandlePriceField::Low),
            "close" => Ok(CandlePriceField::Close),
            other => anyhow::bail!("unsupported CANDLE_PRICE: {other}"),
        }
    }
}

/// Leverage, stop-order, and instrument-identity fields the engine
/// forwards into strategy state verbatim without interpreting, via
/// `Strategy::apply_passthrough_config`. Kept as one sub-struct so
/// `EngineConfig` itself stays readable.
#[derive(Debug, Clone, Default)]
pub struct PassthroughConfig {
    pub use_max_leverage: bool,
    pub leverage: Option<Decimal>,
    pub increase_leverage: bool,
    pub max_leverage: Option<Decimal>,
    pub add_stop_order: bool,
    pub stop_order_percent: Option<Decimal>,
    pub is_derivative: bool,
    pub base_currency: Option<String>,
    pub quote_currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub include_trades: bool,
    pub seed_candle_count: u32,
    pub candle_price: CandlePriceField,
    pub passthrough: PassthroughConfig,
}

impl EngineConfig {
    pub fn builder(symbol: impl Into<String>, timeframe: Timeframe) -> EngineConfigBuilder {
        EngineConfigBuilder::new(symbol, timeframe)
    }

    /// Loads configuration from the process environment. Only the binary
    /// entry point calls this — library/test code always uses the
    /// builder directly.
    pub fn from_env() -> Result<Self> {
        let symbol = env::var("ENGINE_SYMBOL").context("ENGINE_SYMBOL must be set")?;
        let timeframe_str = env::var("ENGINE_TIMEFRAME").unwrap_or_else(|_| "1m".to_string());
        let timeframe: Timeframe = timeframe_str
            .parse()
            .context("failed to parse ENGINE_TIMEFRAME")?;

        let mut builder = EngineConfig::builder(symbol, timeframe);

        if let Ok(v) = env::var("ENGINE_INCLUDE_TRADES") {
            builder = builder.include_trades(v.parse().unwrap_or(false));
        }
        if let Ok(v) = env::var("ENGINE_SEED_CANDLE_COUNT") {
            let count: u32 = v.parse().context("failed to parse ENGINE_SEED_CANDLE_COUNT")?;
            builder = builder.seed_candle_count(count);
        }
        if let Ok(v) = env::var("ENGINE_CANDLE_PRICE") {
            let field: CandlePriceField = v.parse()?;
            builder = builder.candle_price(field);
        }

        Ok(builder.build())
    }
}

pub struct EngineConfigBuilder {
    symbol: String,
    timeframe: Timeframe,
    include_trades: bool,
    seed_candle_count: u32,
    candle_price: CandlePriceField,
    passthrough: PassthroughConfig,
}

impl EngineConfigBuilder {
    fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            include_trades: false,
            seed_candle_count: 5000,
            candle_price: CandlePriceField::default(),
            passthrough: PassthroughConfig::default(),
        }
    }

    pub fn include_trades(mut self, include: bool) -> Self {
        self.include_trades = include;
        self
    }

    pub fn seed_candle_count(mut self, count: u32) -> Self {
        self.seed_candle_count = count;
        self
    }

    pub fn candle_price(mut self, field: CandlePriceField) -> Self {
        self.candle_price = field;
        self
    }

    pub fn passthrough(mut self, passthrough: PassthroughConfig) -> Self {
        self.passthrough = passthrough;
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig {
            symbol: self.symbol,
            timeframe: self.timeframe,
            include_trades: self.include_trades,
            seed_candle_count: self.seed_candle_count,
            candle_price: self.candle_price,
            passthrough: self.passthrough,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn builder_defaults_are_sane() {
        let cfg = EngineConfig::builder("tBTCUSD", Timeframe::OneDay).build();
        assert_eq!(cfg.seed_candle_count, 5000);
        assert_eq!(cfg.candle_price, CandlePriceField::Close);
        assert!(!cfg.include_trades);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = EngineConfig::builder("tBTCUSD", Timeframe::OneMin)
            .include_trades(true)
            .seed_candle_count(100)
            .candle_price(CandlePriceField::High)
            .build();
        assert!(cfg.include_trades);
        assert_eq!(cfg.seed_candle_count, 100);
        assert_eq!(cfg.candle_price, CandlePriceField::High);
    }

    #[test]
    fn candle_price_selects_configured_field() {
        let candle = Candle {
            symbol: "tBTCUSD".into(),
            tf: Timeframe::OneMin,
            mts: 0,
            open: dec!(1),
            high: dec!(2),
            low: dec!(0.5),
            close: dec!(1.5),
            volume: dec!(10),
        };
        assert_eq!(CandlePriceField::Open.select(&candle), dec!(1));
        assert_eq!(CandlePriceField::High.select(&candle), dec!(2));
        assert_eq!(CandlePriceField::Low.select(&candle), dec!(0.5));
        assert_eq!(CandlePriceField::Close.select(&candle), dec!(1.5));
    }
}
