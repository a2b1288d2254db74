//! Gas limit estimation with a safety buffer and a static fallback ceiling.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::chain::GasOracle;
use crate::core::EthernityError;
use crate::types::{CallRequest, FeeSuggestion};

/// Default buffer applied to node estimates (x1.2).
pub const DEFAULT_GAS_BUFFER_PERCENT: u32 = 120;

/// Gas limit used when the node cannot estimate.
pub const DEFAULT_GAS_CEILING: u64 = 2_500_000;

/// Upper bound on a single estimate request.
pub const DEFAULT_GAS_ESTIMATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a gas limit came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasSource {
    /// Node estimate, buffered
    Estimated { raw: u64 },
    /// Static ceiling after a failed or timed-out estimate
    Fallback { reason: String },
}

/// Gas limit to submit with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimate {
    pub gas_limit: u64,
    pub source: GasSource,
}

impl GasEstimate {
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, GasSource::Fallback { .. })
    }
}

/// Wraps a [`GasOracle`]; never fails and never waits longer than its timeout.
#[derive(Clone)]
pub struct GasEstimator {
    oracle: Arc<dyn GasOracle>,
    buffer_percent: u32,
    ceiling: u64,
    timeout: Duration,
}

impl std::fmt::Debug for GasEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GasEstimator")
            .field("buffer_percent", &self.buffer_percent)
            .field("ceiling", &self.ceiling)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GasEstimator {
    #[must_use]
    pub fn new(oracle: Arc<dyn GasOracle>) -> Self {
        Self {
            oracle,
            buffer_percent: DEFAULT_GAS_BUFFER_PERCENT,
            ceiling: DEFAULT_GAS_CEILING,
            timeout: DEFAULT_GAS_ESTIMATE_TIMEOUT,
        }
    }

    /// Set buffer in percent of the raw estimate (120 = x1.2)
    #[must_use]
    pub fn with_buffer_percent(mut self, percent: u32) -> Self {
        self.buffer_percent = percent.max(100);
        self
    }

    /// Set the fallback gas ceiling
    #[must_use]
    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Set estimate request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Estimate `call`. `ceiling` overrides the configured fallback for this call.
    #[instrument(skip_all, fields(to = %call.to))]
    pub async fn estimate(&self, call: &CallRequest, ceiling: Option<u64>) -> GasEstimate {
        let ceiling = ceiling.unwrap_or(self.ceiling);

        let reason = match tokio::time::timeout(self.timeout, self.oracle.estimate_gas(call)).await
        {
            Ok(Ok(raw)) => {
                let gas_limit = apply_buffer(raw, self.buffer_percent);
                debug!(raw, gas_limit, "Gas estimated");
                return GasEstimate {
                    gas_limit,
                    source: GasSource::Estimated { raw },
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => EthernityError::timeout(self.timeout, "eth_estimateGas").to_string(),
        };

        warn!(reason = %reason, gas_limit = ceiling, "Gas estimation failed, using fallback ceiling");
        GasEstimate {
            gas_limit: ceiling,
            source: GasSource::Fallback { reason },
        }
    }

    /// Suggest EIP-1559 fees from the node gas price.
    ///
    /// Priority fee is a tenth of the price, max fee is the price times the
    /// buffer. Any failure is returned as a reason so the signer picks fees.
    #[instrument(skip_all)]
    pub async fn suggest_fees(&self) -> std::result::Result<FeeSuggestion, String> {
        let price = match tokio::time::timeout(self.timeout, self.oracle.gas_price()).await {
            Ok(Ok(price)) => price,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => {
                return Err(EthernityError::timeout(self.timeout, "eth_gasPrice").to_string())
            }
        };

        let fees = fees_from_price(price, self.buffer_percent);
        debug!(
            gas_price = price,
            max_fee = fees.max_fee_per_gas,
            priority_fee = fees.max_priority_fee_per_gas,
            "Fee suggestion"
        );
        Ok(fees)
    }
}

/// `ceil(raw * percent / 100)`, saturating.
#[must_use]
pub fn apply_buffer(raw: u64, percent: u32) -> u64 {
    let scaled = u128::from(raw) * u128::from(percent);
    let buffered = scaled.div_ceil(100);
    u64::try_from(buffered).unwrap_or(u64::MAX)
}

/// Fee caps derived from a legacy gas price.
#[must_use]
pub fn fees_from_price(gas_price: u128, buffer_percent: u32) -> FeeSuggestion {
    let max_fee = gas_price
        .saturating_mul(u128::from(buffer_percent))
        .div_ceil(100);
    let priority = gas_price / 10;
    FeeSuggestion {
        max_fee_per_gas: max_fee.max(priority),
        max_priority_fee_per_gas: priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Result;
    use alloy_primitives::{Address, Bytes};
    use async_trait::async_trait;

    enum Behavior {
        Ok(u64),
        Fail,
        Hang,
    }

    struct StubOracle(Behavior);

    #[async_trait]
    impl GasOracle for StubOracle {
        async fn estimate_gas(&self, _call: &CallRequest) -> Result<u64> {
            match self.0 {
                Behavior::Ok(gas) => Ok(gas),
                Behavior::Fail => Err(EthernityError::rpc(Some(3), "execution reverted")),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(0)
                }
            }
        }

        async fn gas_price(&self) -> Result<u128> {
            match self.0 {
                Behavior::Ok(_) => Ok(100),
                _ => Err(EthernityError::network_simple("down")),
            }
        }
    }

    fn call() -> CallRequest {
        CallRequest::new(Address::repeat_byte(9), Bytes::new())
    }

    #[test]
    fn test_apply_buffer_rounds_up() {
        assert_eq!(apply_buffer(100_000, 120), 120_000);
        assert_eq!(apply_buffer(21_001, 120), 25_202);
        assert_eq!(apply_buffer(1, 130), 2);
        assert_eq!(apply_buffer(u64::MAX, 200), u64::MAX);
    }

    #[test]
    fn test_fees_from_price() {
        let fees = fees_from_price(1_000, 120);
        assert_eq!(fees.max_fee_per_gas, 1_200);
        assert_eq!(fees.max_priority_fee_per_gas, 100);
    }

    #[tokio::test]
    async fn test_estimate_applies_buffer() {
        let est = GasEstimator::new(Arc::new(StubOracle(Behavior::Ok(50_000))));
        let got = est.estimate(&call(), None).await;
        assert_eq!(got.gas_limit, 60_000);
        assert_eq!(got.source, GasSource::Estimated { raw: 50_000 });
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_ceiling() {
        let est = GasEstimator::new(Arc::new(StubOracle(Behavior::Fail))).with_ceiling(2_000_000);
        let got = est.estimate(&call(), None).await;
        assert_eq!(got.gas_limit, 2_000_000);
        assert!(got.is_fallback());

        let per_call = est.estimate(&call(), Some(300_000)).await;
        assert_eq!(per_call.gas_limit, 300_000);
        assert!(est.suggest_fees().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_node_is_bounded() {
        let est = GasEstimator::new(Arc::new(StubOracle(Behavior::Hang)))
            .with_timeout(Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        let got = est.estimate(&call(), None).await;
        assert!(got.is_fallback());
        assert_eq!(got.gas_limit, DEFAULT_GAS_CEILING);
        assert!(started.elapsed() < Duration::from_secs(6));
    }
}
