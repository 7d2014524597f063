//! Prometheus metrics for claim attempts

use prometheus::{histogram_opts, opts, Encoder, Histogram, IntCounterVec, Registry, TextEncoder};

/// Owns its own registry so several instances can coexist (one per test)
#[derive(Debug, Clone)]
pub struct FaucetMetrics {
    registry: Registry,
    claims_total: IntCounterVec,
    claim_duration: Histogram,
}

impl FaucetMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let claims_total = IntCounterVec::new(
            opts!("faucet_claims_total", "Claim attempts by outcome"),
            &["outcome"],
        )?;

        let claim_duration = Histogram::with_opts(histogram_opts!(
            "faucet_claim_duration_seconds",
            "Time from receiving a claim to its outcome",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        ))?;

        registry.register(Box::new(claims_total.clone()))?;
        registry.register(Box::new(claim_duration.clone()))?;

        Ok(Self {
            registry,
            claims_total,
            claim_duration,
        })
    }

    /// `outcome` is `success` or an error code such as `RATE_LIMITED`
    pub fn record_claim(&self, outcome: &str, seconds: f64) {
        self.claims_total.with_label_values(&[outcome]).inc();
        self.claim_duration.observe(seconds);
    }

    pub fn claims(&self, outcome: &str) -> u64 {
        self.claims_total.with_label_values(&[outcome]).get()
    }

    /// Text exposition format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_gather() {
        let metrics = FaucetMetrics::new().unwrap();
        metrics.record_claim("success", 0.2);
        metrics.record_claim("RATE_LIMITED", 0.01);
        metrics.record_claim("RATE_LIMITED", 0.01);

        assert_eq!(metrics.claims("success"), 1);
        assert_eq!(metrics.claims("RATE_LIMITED"), 2);

        let text = metrics.gather().unwrap();
        assert!(text.contains("faucet_claims_total{outcome=\"RATE_LIMITED\"} 2"));
        assert!(text.contains("faucet_claim_duration_seconds_count 3"));
    }
}
