/// Workers required to clear the current backlog within `drain_horizon_seconds`
/// while keeping pace with new arrivals.
///
/// Service demand is `pending / H` jobs per second to drain, plus `λ / 60`
/// jobs per second arriving; each worker delivers `1 / D` jobs per second,
/// so `N = ⌈(pending/H + λ/60) · D⌉`.
///
/// A non-positive horizon is treated as one second, the most aggressive drain
/// we can express. When arrivals alone saturate what `max_workers` can serve,
/// the full `max_workers` is returned without consulting the backlog.
pub fn workers_to_drain(
    pending: u64,
    arrival_rate_per_minute: f64,
    avg_job_duration_seconds: f64,
    drain_horizon_seconds: f64,
    max_workers: usize,
) -> usize {
    let horizon = if drain_horizon_seconds.is_finite() && drain_horizon_seconds > 0.0 {
        drain_horizon_seconds
    } else {
        1.0
    };
    let duration = if avg_job_duration_seconds.is_finite() && avg_job_duration_seconds > 0.0 {
        avg_job_duration_seconds
    } else {
        return if pending == 0 { 0 } else { max_workers.min(1) };
    };
    let arrivals_per_second = if arrival_rate_per_minute.is_finite() && arrival_rate_per_minute > 0.0
    {
        arrival_rate_per_minute / 60.0
    } else {
        0.0
    };

    // Each worker serves 1/duration jobs per second; if steady-state arrivals
    // already exceed the whole pool's service rate, drain math is moot.
    if arrivals_per_second >= max_workers as f64 / duration {
        return max_workers;
    }

    let demand = pending as f64 / horizon + arrivals_per_second;
    (demand * duration).ceil() as usize
}
