use std::collections::VecDeque;

/// Minimum samples before a fit is attempted.
const MIN_SAMPLES: usize = 3;

/// Least-squares trend over recent head-of-line age samples.
///
/// Holds a bounded ring of `(timestamp, oldest_job_age)` observations with
/// monotonically increasing timestamps and extrapolates the fitted line
/// `lookahead` seconds past the newest sample. The output is advisory; the
/// predictive strategy decides whether to act on it.
#[derive(Debug, Clone)]
pub struct TrendPredictor {
    samples: VecDeque<(f64, f64)>,
    capacity: usize,
}

impl TrendPredictor {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(MIN_SAMPLES)),
            capacity: capacity.max(MIN_SAMPLES),
        }
    }

    /// Record an observation. Samples must arrive in time order; an
    /// observation at or before the newest timestamp is dropped.
    pub fn record(&mut self, timestamp_seconds: f64, oldest_job_age_seconds: f64) {
        if !(timestamp_seconds.is_finite() && oldest_job_age_seconds.is_finite()) {
            return;
        }
        if let Some(&(last, _)) = self.samples.back() {
            if timestamp_seconds <= last {
                return;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((timestamp_seconds, oldest_job_age_seconds));
    }

    /// Predicted head-of-line age `lookahead_seconds` after the newest sample.
    ///
    /// `None` until enough samples exist or when the sample timestamps carry
    /// no variance. Negative extrapolations are floored at zero.
    pub fn predict(&self, lookahead_seconds: f64) -> Option<f64> {
        if self.samples.len() < MIN_SAMPLES {
            return None;
        }

        let n = self.samples.len() as f64;
        let mean_t = self.samples.iter().map(|(t, _)| t).sum::<f64>() / n;
        let mean_age = self.samples.iter().map(|(_, a)| a).sum::<f64>() / n;

        let mut covariance = 0.0;
        let mut variance = 0.0;
        for &(t, age) in &self.samples {
            covariance += (t - mean_t) * (age - mean_age);
            variance += (t - mean_t) * (t - mean_t);
        }
        if variance == 0.0 {
            return None;
        }

        let slope = covariance / variance;
        let intercept = mean_age - slope * mean_t;
        let (newest_t, _) = *self.samples.back()?;
        let predicted = intercept + slope * (newest_t + lookahead_seconds);
        Some(predicted.max(0.0))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
