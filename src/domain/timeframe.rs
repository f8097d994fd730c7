use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar width for a candle series.
///
/// Mirrors the exchange's own timeframe identifiers (`"1m"`, `"1D"`, ...)
/// so engine-internal code never round-trips through a raw string when it
/// needs a bucket width in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    FourHour,
    OneDay,
}

impl Timeframe {
    /// Width of one bar, in milliseconds. The single source of truth for
    /// every "aligned to a multiple of the timeframe" invariant in the
    /// engine (padding, seeding, the closure watchdog).
    pub fn width_ms(&self) -> i64 {
        match self {
            Timeframe::OneMin => 60_000,
            Timeframe::FiveMin => 5 * 60_000,
            Timeframe::FifteenMin => 15 * 60_000,
            Timeframe::ThirtyMin => 30 * 60_000,
            Timeframe::OneHour => 60 * 60_000,
            Timeframe::FourHour => 4 * 60 * 60_000,
            Timeframe::OneDay => 24 * 60 * 60_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHour => "4h",
            Timeframe::OneDay => "1D",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::OneMin),
            "5m" => Ok(Timeframe::FiveMin),
            "15m" => Ok(Timeframe::FifteenMin),
            "30m" => Ok(Timeframe::ThirtyMin),
            "1h" | "1H" => Ok(Timeframe::OneHour),
            "4h" | "4H" => Ok(Timeframe::FourHour),
            "1D" | "1d" => Ok(Timeframe::OneDay),
            other => Err(anyhow!("unsupported timeframe: {other}")),
        }
    }
}

/// Aligns `mts` down to the nearest multiple of `width_ms`.
pub fn align_down(mts: i64, width_ms: i64) -> i64 {
    mts - mts.rem_euclid(width_ms)
}
