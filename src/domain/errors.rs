use thiserror::Error;

/// Errors the engine surfaces as distinct, typed failures. Everything
/// else (dropped duplicates, unknown message types, swallowed
/// pause-resume fetch failures) is normal control flow, logged via
/// `tracing` rather than modeled as an `EngineError` variant.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine misconfigured: {reason}")]
    Configuration { reason: String },

    #[error("seeding fetch failed for {symbol} {timeframe}: {source}")]
    SeedFetch {
        symbol: String,
        timeframe: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pause-resume back-fill fetch failed for {symbol}: {source}")]
    PauseResumeFetch {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("strategy callback '{callback}' failed: {source}")]
    StrategyCallback {
        callback: &'static str,
        #[source]
        source: anyhow::Error,
    },
}
