use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::timeframe::Timeframe;

/// OHLCV aggregate over `[mts, mts + tf.width_ms())`.
///
/// Within a series all `mts` are multiples of `tf.width_ms()`. `mts` is
/// strictly increasing once a candle has closed; an "updating" candle
/// shares the `mts` of the currently-open bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub tf: Timeframe,
    pub mts: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn synthetic(symbol: &str, tf: Timeframe, mts: i64, close: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            tf,
            mts,
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
        }
    }
}

/// A single exchange trade. `id` is strictly increasing in emission order;
/// duplicates (lower-or-equal `id`) are dropped by the serial processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub symbol: String,
    pub mts: i64,
    pub price: Decimal,
    pub amount: Decimal,
}

/// One wallet entry, identified by `(currency, wallet_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub currency: String,
    pub wallet_type: String,
    pub balance: Decimal,
    pub balance_available: Decimal,
}

impl Wallet {
    pub fn key(&self) -> (String, String) {
        (self.currency.clone(), self.wallet_type.clone())
    }
}

/// An incoming wallet delta. `None` means the field was absent from the
/// wire message; `Some(Decimal::ZERO)` means the exchange sent an
/// explicit zero. Both are treated as "not provided" and leave the
/// matching wallet field untouched — a quirk in the system this engine
/// replaces, preserved deliberately rather than "fixed". Modeling both
/// cases as `Option` (instead of collapsing "absent" and "zero" into one
/// bare `Decimal`) keeps the quirk visible at the type rather than buried
/// in an `if val != 0` in dispatch logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletUpdate {
    pub currency: String,
    pub wallet_type: String,
    pub balance: Option<Decimal>,
    pub balance_available: Option<Decimal>,
}

impl WalletUpdate {
    /// Collapses the absent/explicit-zero quirk into a single check: a
    /// value that should actually overwrite the wallet field, or `None`
    /// if it should be left alone.
    pub fn effective_balance(&self) -> Option<Decimal> {
        self.balance.filter(|b| !b.is_zero())
    }

    pub fn effective_balance_available(&self) -> Option<Decimal> {
        self.balance_available.filter(|b| !b.is_zero())
    }
}

/// Opaque order-close payload. The engine forwards this to the strategy
/// without interpreting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCloseEvent(pub serde_json::Value);

/// A normalized message on the serial processor's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueMessage {
    Candle(Candle),
    Trade(Trade),
    OrderClose(OrderCloseEvent),
    WalletSnapshot(Vec<Wallet>),
    WalletUpdate(WalletUpdate),
}

impl QueueMessage {
    /// `mts` used to order messages during the resume-time stable sort.
    /// Non-timestamped message kinds sort as "now" (end of queue) since
    /// they have no natural position in the candle/trade timeline.
    pub fn sort_mts(&self, fallback: i64) -> i64 {
        match self {
            QueueMessage::Candle(c) => c.mts,
            QueueMessage::Trade(t) => t.mts,
            _ => fallback,
        }
    }
}

/// A strategy's open position, as reported by `Strategy::get_position`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn synthetic_candle_carries_previous_close() {
        let c = Candle::synthetic("tBTCUSD", Timeframe::OneMin, 120_000, dec!(100));
        assert_eq!(c.open, dec!(100));
        assert_eq!(c.high, dec!(100));
        assert_eq!(c.low, dec!(100));
        assert_eq!(c.close, dec!(100));
        assert_eq!(c.volume, Decimal::ZERO);
        assert_eq!(c.mts, 120_000);
    }

    #[test]
    fn wallet_key_identity() {
        let w = Wallet {
            currency: "USD".into(),
            wallet_type: "exchange".into(),
            balance: dec!(100),
            balance_available: dec!(100),
        };
        assert_eq!(w.key(), ("USD".to_string(), "exchange".to_string()));
    }
}
