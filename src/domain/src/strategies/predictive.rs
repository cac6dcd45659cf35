use shared::error::Result;

use crate::calculators::{clamp_to_limits, required_workers, TrendPredictor};
use crate::entities::metrics::QueueMetrics;
use crate::entities::queue::QueueConfiguration;
use crate::strategies::{check_metrics, effective_job_duration, ScalingStrategy};

/// Trend-aware sizing: when the fitted head-of-line age would cross the SLA
/// within the lookahead window, size for the backlog expected by then instead
/// of the backlog seen now.
pub struct PredictiveStrategy {
    predictor: TrendPredictor,
    reason: String,
    prediction: Option<f64>,
}

impl PredictiveStrategy {
    pub const NAME: &'static str = "predictive";

    pub fn new(config: &QueueConfiguration) -> Self {
        Self {
            predictor: TrendPredictor::new(config.trend_samples),
            reason: String::new(),
            prediction: None,
        }
    }
}

impl ScalingStrategy for PredictiveStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn target_workers(
        &mut self,
        metrics: &QueueMetrics,
        config: &QueueConfiguration,
        now_seconds: f64,
    ) -> Result<usize> {
        check_metrics(metrics, config)?;

        self.predictor.record(now_seconds, metrics.oldest_job_age_seconds);
        let lookahead = config.predict_lookahead_seconds;
        self.prediction = self.predictor.predict(lookahead);

        let duration = effective_job_duration(metrics, config);
        let pickup_target = config.sla_seconds / 2.0;

        let breach_ahead = self
            .prediction
            .map(|age| age >= config.sla_seconds)
            .unwrap_or(false);

        let raw = if breach_ahead {
            // Size for the jobs expected to be queued by the predicted
            // breach, not just the ones already here.
            let incoming = (metrics.arrival_rate_per_minute * lookahead / 60.0).ceil() as u64;
            let expected_pending = metrics.pending + incoming;
            self.reason = format!(
                "predicted age {:.0}s exceeds SLA {:.0}s within {:.0}s; sizing for {} jobs",
                self.prediction.unwrap_or_default(),
                config.sla_seconds,
                lookahead,
                expected_pending
            );
            required_workers(expected_pending, duration, pickup_target, config.min_workers)
        } else {
            let raw = required_workers(
                metrics.pending,
                duration,
                pickup_target,
                config.min_workers,
            );
            self.reason = if raw == 0 {
                "minimum workers".to_string()
            } else {
                format!(
                    "no predicted breach; pending={} sized for pickup within {:.0}s",
                    metrics.pending, pickup_target
                )
            };
            raw
        };

        Ok(clamp_to_limits(raw, config.min_workers, config.max_workers))
    }

    fn last_reason(&self) -> &str {
        &self.reason
    }

    fn last_prediction(&self) -> Option<f64> {
        self.prediction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn no_prediction_until_enough_samples() {
        let config = test_support::config();
        let mut strategy = PredictiveStrategy::new(&config);
        strategy
            .target_workers(&test_support::metrics(0, 1.0), &config, 0.0)
            .unwrap();
        strategy
            .target_workers(&test_support::metrics(0, 2.0), &config, 5.0)
            .unwrap();
        assert_eq!(strategy.last_prediction(), None);
    }

    #[test]
    fn growing_age_triggers_preemptive_sizing() {
        let mut config = test_support::config();
        config.max_workers = 50;
        let mut strategy = PredictiveStrategy::new(&config);

        // Age climbs 4s per 5s tick: crosses the 30s SLA well inside the
        // 30s lookahead once the fit stabilises.
        let mut target = 0;
        for i in 0..5u32 {
            let mut metrics = test_support::metrics(20, 4.0 * (i + 1) as f64);
            metrics.arrival_rate_per_minute = 60.0;
            target = strategy
                .target_workers(&metrics, &config, 5.0 * i as f64)
                .unwrap();
        }

        assert!(strategy.last_prediction().unwrap() >= config.sla_seconds);
        assert!(strategy.last_reason().contains("predicted age"));
        // 20 pending + 30 expected arrivals at 1s each over a 15s target.
        assert_eq!(target, 4);
    }

    #[test]
    fn flat_age_stays_reactive() {
        let config = test_support::config();
        let mut strategy = PredictiveStrategy::new(&config);
        for i in 0..5u32 {
            strategy
                .target_workers(&test_support::metrics(30, 2.0), &config, 5.0 * i as f64)
                .unwrap();
        }
        assert_eq!(strategy.last_prediction(), Some(2.0));
        assert!(strategy.last_reason().contains("no predicted breach"));
    }
}
