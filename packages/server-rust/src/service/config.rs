use rust_decimal::Decimal;

/// Amount above which a top-up raises the `HighValueTopUp` request flag.
pub const DEFAULT_HIGH_VALUE_THRESHOLD: i64 = 1000;

/// Server-level configuration for the top-up pipeline.
///
/// Controls operation timeouts, concurrency limits, the high-value threshold
/// applied by provider strategies, and the hand-off worker cadence.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Default timeout for a dispatched top-up in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// Maximum number of concurrent top-ups before load shedding.
    pub max_concurrent_operations: u32,
    /// Top-ups strictly above this amount are flagged as high value.
    pub high_value_threshold: Decimal,
    /// Interval between hand-off worker summary ticks in milliseconds.
    pub intent_tick_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_operation_timeout_ms: 30_000,
            max_concurrent_operations: 1000,
            high_value_threshold: Decimal::from(DEFAULT_HIGH_VALUE_THRESHOLD),
            intent_tick_interval_ms: 60_000,
        }
    }
}
