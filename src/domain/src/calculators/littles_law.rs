/// Workers required to pick up `pending` jobs within `target_pickup_seconds`,
/// given an average service time of `avg_job_duration_seconds` per job.
///
/// Rearranged Little's Law (`L = λW`): with a backlog of L jobs each taking
/// D seconds, N workers clear the backlog in `L·D / N` seconds, so hitting a
/// pickup target T needs `N = ⌈L·D / T⌉`.
///
/// Returns 0 for an empty backlog. When the duration or target is zero,
/// negative, or non-finite the equation is meaningless and the caller's
/// `fallback` (normally the queue minimum) is returned instead.
pub fn required_workers(
    pending: u64,
    avg_job_duration_seconds: f64,
    target_pickup_seconds: f64,
    fallback: usize,
) -> usize {
    if pending == 0 {
        return 0;
    }
    if !(avg_job_duration_seconds.is_finite() && avg_job_duration_seconds > 0.0) {
        return fallback;
    }
    if !(target_pickup_seconds.is_finite() && target_pickup_seconds > 0.0) {
        return fallback;
    }

    let required = (pending as f64 * avg_job_duration_seconds) / target_pickup_seconds;
    required.ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_backlog_needs_no_workers() {
        assert_eq!(required_workers(0, 1.0, 15.0, 3), 0);
    }

    #[test]
    fn sizes_backlog_against_pickup_target() {
        // 100 jobs at 1s each, picked up within 15s -> ceil(100/15) = 7.
        assert_eq!(required_workers(100, 1.0, 15.0, 1), 7);
        // Exact division needs no rounding.
        assert_eq!(required_workers(30, 1.0, 15.0, 1), 2);
    }

    #[test]
    fn long_jobs_demand_more_workers() {
        assert_eq!(required_workers(10, 60.0, 30.0, 1), 20);
    }

    #[test]
    fn degenerate_duration_returns_fallback() {
        assert_eq!(required_workers(10, 0.0, 15.0, 4), 4);
        assert_eq!(required_workers(10, f64::NAN, 15.0, 4), 4);
        assert_eq!(required_workers(10, f64::INFINITY, 15.0, 4), 4);
    }

    #[test]
    fn degenerate_target_returns_fallback() {
        assert_eq!(required_workers(10, 1.0, 0.0, 2), 2);
        assert_eq!(required_workers(10, 1.0, -5.0, 2), 2);
        assert_eq!(required_workers(10, 1.0, f64::NAN, 2), 2);
    }
}
