use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use shared::error::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;

use domain::calculators::apply_global_cap;
use domain::entities::decision::{ScaleAction, ScalingDecision};
use domain::entities::metrics::QueueMetrics;
use domain::entities::queue::{QueueConfiguration, QueueKey};
use domain::events::AutoscaleEvent;
use domain::policies::PolicyPipeline;
use domain::sla::{SlaTracker, SlaTransition};
use infrastructure::config::Config;
use infrastructure::launcher::ProcessLauncher;
use infrastructure::metrics::MetricsSource;
use infrastructure::pool::{WorkerPool, WorkerProcess};
use infrastructure::stdout::{parse_activity, JobActivity};

use crate::engine::ScalingEngine;
use crate::sinks::{ChannelEventSink, EventDispatcher, TracingEventSink};
use crate::snapshot::{OutputData, QueueSnapshot, WorkerSnapshot};

/// Consecutive per-queue fetch failures before degraded mode is announced.
const DEGRADED_THRESHOLD: u32 = 3;
/// Consecutive ticks with every queue failing before the supervisor gives up.
const METRICS_EXHAUSTED_TICKS: u32 = 10;
const ACTIVITY_CAPACITY: usize = 100;
const SCALING_LOG_CAPACITY: usize = 50;
/// Stdout lines consumed per worker per tick; the rest wait for the next one.
const MAX_LINES_PER_WORKER_PER_TICK: usize = 200;

/// Why the supervisor's run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Signal-requested shutdown; workers were terminated cleanly.
    Shutdown,
    /// Every queue's metrics source failed for a sustained window.
    MetricsExhausted,
}

/// A worker removed from the pool and waiting to actually die.
struct DrainingWorker {
    worker: WorkerProcess,
    /// When SIGTERM patience runs out and SIGKILL follows.
    deadline: Instant,
    forced: bool,
    unreapable_since: Option<Instant>,
}

/// The supervisor: owns the pool, the policy state and the SLA map, and
/// reconciles live worker processes toward each tick's decisions.
///
/// Everything here runs on one control task. Renderers and subscribers get
/// immutable snapshots and event records over channels; nothing else ever
/// sees the pool.
pub struct AutoscaleManager {
    config: Config,
    queues: Vec<QueueConfiguration>,
    engine: ScalingEngine,
    policies: PolicyPipeline,
    pool: WorkerPool,
    metrics_source: Arc<dyn MetricsSource>,
    launcher: Arc<dyn ProcessLauncher>,
    events: EventDispatcher,
    sla: HashMap<QueueKey, SlaTracker>,
    fetch_failures: HashMap<QueueKey, u32>,
    degraded: HashSet<QueueKey>,
    exhausted_ticks: u32,
    draining: Vec<DrainingWorker>,
    activity: VecDeque<JobActivity>,
    scaling_log: VecDeque<String>,
    last_queue_stats: HashMap<QueueKey, QueueSnapshot>,
    snapshot_tx: flume::Sender<OutputData>,
    config_path: Option<PathBuf>,
    stopping: bool,
}

impl AutoscaleManager {
    /// Wire up a supervisor. Returns the receiving end of the per-tick
    /// snapshot channel alongside it.
    pub fn new(
        config: Config,
        metrics_source: Arc<dyn MetricsSource>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<(Self, flume::Receiver<OutputData>)> {
        let queues = config.queue_configurations();
        let engine = ScalingEngine::from_configs(&queues)?;
        let mut events = EventDispatcher::new();
        events.push(Box::new(TracingEventSink));
        let (snapshot_tx, snapshot_rx) = flume::unbounded();

        Ok((
            Self {
                config,
                queues,
                engine,
                policies: PolicyPipeline::with_defaults(),
                pool: WorkerPool::new(),
                metrics_source,
                launcher,
                events,
                sla: HashMap::new(),
                fetch_failures: HashMap::new(),
                degraded: HashSet::new(),
                exhausted_ticks: 0,
                draining: Vec::new(),
                activity: VecDeque::with_capacity(ACTIVITY_CAPACITY),
                scaling_log: VecDeque::with_capacity(SCALING_LOG_CAPACITY),
                last_queue_stats: HashMap::new(),
                snapshot_tx,
                config_path: None,
                stopping: false,
            },
            snapshot_rx,
        ))
    }

    /// Remember where the configuration came from so SIGHUP can reload it.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Attach an external event subscriber.
    pub fn subscribe_events(&mut self) -> flume::Receiver<AutoscaleEvent> {
        let (sink, rx) = ChannelEventSink::new();
        self.events.push(Box::new(sink));
        rx
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn request_stop(&mut self) {
        self.stopping = true;
    }

    /// True once every queue's metrics source has failed for the sustained
    /// window that [`RunOutcome::MetricsExhausted`] reports.
    pub fn metrics_exhausted(&self) -> bool {
        self.exhausted_ticks >= METRICS_EXHAUSTED_TICKS
    }

    /// Run until a shutdown signal or sustained metrics exhaustion.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.tick_seconds));
        // A tick that overruns is skipped, never queued; drift is fine.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigusr1 = signal(SignalKind::user_defined1())?;

        tracing::info!(
            queues = self.queues.len(),
            tick_seconds = self.config.tick_seconds,
            "supervisor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.stopping {
                        break;
                    }
                    self.tick().await;
                    if self.exhausted_ticks >= METRICS_EXHAUSTED_TICKS {
                        tracing::error!(
                            ticks = self.exhausted_ticks,
                            "metrics source failed for every queue over a sustained window"
                        );
                        self.shutdown().await;
                        return Ok(RunOutcome::MetricsExhausted);
                    }
                }
                _ = sigint.recv() => {
                    tracing::info!("SIGINT received; stopping");
                    break;
                }
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received; stopping");
                    break;
                }
                _ = sighup.recv() => {
                    self.reload_config();
                }
                _ = sigusr1.recv() => {
                    self.dump_snapshot();
                }
            }
        }

        self.stopping = true;
        self.shutdown().await;
        Ok(RunOutcome::Shutdown)
    }

    /// One pass of the control loop. Public so scenario tests can drive the
    /// supervisor without the timer.
    pub async fn tick(&mut self) {
        let tick_started = Instant::now();
        let fetch_deadline = Duration::from_secs(self.config.tick_seconds.max(1)) / 2;

        // Pull metrics for every queue; a failing queue skips this tick.
        let mut gathered: Vec<(usize, QueueMetrics)> = Vec::new();
        for index in 0..self.queues.len() {
            let queue = self.queues[index].clone();
            let key = queue.key();
            let fetch = self.metrics_source.fetch(&queue.connection, &queue.queue);
            let outcome = tokio::time::timeout(fetch_deadline, fetch).await;
            match outcome {
                Ok(Ok(metrics)) => {
                    self.note_fetch_success(&key);
                    gathered.push((index, metrics));
                }
                Ok(Err(e)) => self.note_fetch_failure(&key, e.to_string()),
                Err(_) => self.note_fetch_failure(
                    &key,
                    format!("no response within {:.1}s", fetch_deadline.as_secs_f64()),
                ),
            }
        }

        if gathered.is_empty() && !self.queues.is_empty() {
            self.exhausted_ticks += 1;
        } else {
            self.exhausted_ticks = 0;
        }

        // Strategy decisions, then the system-wide cap across them.
        let mut decisions: Vec<(usize, QueueMetrics, ScalingDecision)> = Vec::new();
        for (index, metrics) in gathered {
            let queue = self.queues[index].clone();
            let current = self.pool.count(&queue.key());
            let decision = self.engine.decide(&queue, &metrics, current);
            decisions.push((index, metrics, decision));
        }

        if let Some(global_max) = self.config.global_max_workers {
            let targets: Vec<usize> = decisions.iter().map(|(_, _, d)| d.to_workers).collect();
            let minimums: Vec<usize> = decisions
                .iter()
                .map(|(i, _, _)| self.queues[*i].min_workers)
                .collect();
            let capped = apply_global_cap(&targets, &minimums, global_max);
            for (slot, (_, _, decision)) in decisions.iter_mut().enumerate() {
                if capped[slot] != decision.to_workers {
                    *decision = decision.with_target(
                        capped[slot],
                        format!("{} (global cap {})", decision.reason, global_max),
                    );
                }
            }
        }

        // Policies, SLA bookkeeping and reconciliation, in configuration
        // order. A fault here is contained to its queue.
        for (index, metrics, decision) in decisions {
            let queue = self.queues[index].clone();
            self.reconcile_queue(&queue, &metrics, decision).await;
        }

        self.reap_dead_workers();
        self.reap_draining(Instant::now());
        self.drain_worker_stdout();
        self.publish_snapshot();
        tracing::debug!(elapsed_ms = tick_started.elapsed().as_millis() as u64, "tick complete");
    }

    fn note_fetch_success(&mut self, key: &QueueKey) {
        self.fetch_failures.insert(key.clone(), 0);
        if self.degraded.remove(key) {
            self.events.emit(&AutoscaleEvent::DegradedModeRecovered {
                key: key.clone(),
                at: Utc::now(),
            });
        }
    }

    fn note_fetch_failure(&mut self, key: &QueueKey, error: String) {
        let failures = self.fetch_failures.entry(key.clone()).or_insert(0);
        *failures += 1;
        let failures = *failures;
        tracing::warn!(queue = %key, failures, %error, "metrics fetch failed; skipping queue this tick");
        if failures >= DEGRADED_THRESHOLD && self.degraded.insert(key.clone()) {
            self.events.emit(&AutoscaleEvent::DegradedModeEntered {
                key: key.clone(),
                consecutive_failures: failures,
                at: Utc::now(),
            });
        }
    }

    async fn reconcile_queue(
        &mut self,
        queue: &QueueConfiguration,
        metrics: &QueueMetrics,
        decision: ScalingDecision,
    ) {
        let now = Instant::now();
        let key = queue.key();
        let decision = self.policies.before_scaling(decision, queue, now);

        self.update_sla(queue, metrics, decision.from_workers);

        match decision.action {
            ScaleAction::ScaleUp => {
                let wanted = decision.to_workers - decision.from_workers;
                let results = self.launcher.spawn(queue, wanted).await;
                let mut spawned = 0usize;
                for result in results {
                    match result {
                        Ok(worker) => match self.pool.add(worker) {
                            Ok(()) => spawned += 1,
                            Err(e) => tracing::error!(queue = %key, error = %e, "spawned worker could not join pool"),
                        },
                        Err(e) => {
                            tracing::warn!(queue = %key, error = %e, "worker spawn failed; the shortfall retries next tick");
                        }
                    }
                }
                if spawned < wanted {
                    tracing::warn!(queue = %key, wanted, spawned, "partial spawn");
                }
            }
            ScaleAction::ScaleDown => {
                let shed = decision.from_workers - decision.to_workers;
                let victims = self.pool.remove(&key, shed);
                let deadline = now + Duration::from_secs(self.config.grace_period_seconds);
                for victim in victims {
                    if let Err(e) = self.launcher.terminate_graceful(&victim) {
                        tracing::warn!(pid = victim.pid, error = %e, "graceful terminate failed; reaper will escalate");
                    }
                    self.draining.push(DrainingWorker {
                        worker: victim,
                        deadline,
                        forced: false,
                        unreapable_since: None,
                    });
                }
            }
            ScaleAction::Hold => {}
        }

        self.policies.after_scaling(&decision, now);

        if decision.action != ScaleAction::Hold {
            self.push_scaling_log(format!("{} {}", Utc::now().format("%H:%M:%S"), decision));
            self.events.emit(&AutoscaleEvent::WorkersScaled {
                key: key.clone(),
                from_workers: decision.from_workers,
                to_workers: decision.to_workers,
                action: decision.action,
                reason: decision.reason.clone(),
                at: Utc::now(),
            });
        } else {
            tracing::debug!(queue = %key, reason = %decision.reason, "holding");
        }

        let tracker_status = self
            .sla
            .get(&key)
            .map(|t| t.status())
            .unwrap_or(domain::sla::SlaStatus::Ok);
        self.last_queue_stats.insert(
            key.clone(),
            QueueSnapshot {
                key,
                pending: metrics.pending,
                reserved: metrics.reserved,
                throughput_per_minute: metrics.throughput_per_minute,
                oldest_job_age_seconds: metrics.oldest_job_age_seconds,
                sla_status: tracker_status,
                active_workers: self.pool.count(&queue.key()),
                target_workers: decision.to_workers,
                strategy: decision.source_strategy.clone(),
                last_reason: decision.reason.clone(),
            },
        );
    }

    fn update_sla(&mut self, queue: &QueueConfiguration, metrics: &QueueMetrics, active: usize) {
        let key = queue.key();
        let tracker = self.sla.entry(key.clone()).or_default();
        let transition = tracker.observe(
            metrics.oldest_job_age_seconds,
            queue.sla_seconds,
            queue.warn_fraction,
            queue.recovery_factor,
        );
        match transition {
            SlaTransition::Breached => self.events.emit(&AutoscaleEvent::SlaBreached {
                key,
                oldest_job_age_seconds: metrics.oldest_job_age_seconds,
                sla_seconds: queue.sla_seconds,
                pending: metrics.pending,
                active_workers: active,
                at: Utc::now(),
            }),
            SlaTransition::Recovered => self.events.emit(&AutoscaleEvent::SlaRecovered {
                key,
                oldest_job_age_seconds: metrics.oldest_job_age_seconds,
                sla_seconds: queue.sla_seconds,
                pending: metrics.pending,
                active_workers: active,
                at: Utc::now(),
            }),
            SlaTransition::None => {}
        }
    }

    /// Detect exited workers and free their slots.
    fn reap_dead_workers(&mut self) {
        for pid in self.pool.pids() {
            let running = self.pool.get(pid).map(|w| w.running).unwrap_or(false);
            if running && !self.launcher.is_alive(pid) {
                self.pool.mark_dead(pid);
            }
        }

        let dead: Vec<u32> = self.pool.dead_workers().iter().map(|w| w.pid).collect();
        for pid in dead {
            if let Some(worker) = self.pool.remove_worker(pid) {
                self.flush_worker_stdout(&worker);
                tracing::info!(pid, queue = %worker.key(), "reaped dead worker");
            }
        }
    }

    /// Walk workers we asked to stop: drop the dead, escalate the overdue.
    fn reap_draining(&mut self, now: Instant) {
        let launcher = Arc::clone(&self.launcher);
        let grace = Duration::from_secs(self.config.grace_period_seconds);
        let mut survivors = Vec::new();

        for mut entry in std::mem::take(&mut self.draining) {
            if !launcher.is_alive(entry.worker.pid) {
                self.flush_worker_stdout(&entry.worker);
                tracing::debug!(pid = entry.worker.pid, "terminated worker reaped");
                continue;
            }
            if let Some(since) = entry.unreapable_since {
                if now.saturating_duration_since(since) >= grace {
                    tracing::error!(
                        pid = entry.worker.pid,
                        "unreapable worker abandoned; its slot is considered free"
                    );
                    continue;
                }
            } else if !entry.forced && now >= entry.deadline {
                match launcher.terminate_forceful(&entry.worker) {
                    Ok(()) => entry.forced = true,
                    Err(e) => {
                        tracing::error!(pid = entry.worker.pid, error = %e, "forceful terminate failed; marking unreapable");
                        entry.unreapable_since = Some(now);
                    }
                }
            }
            survivors.push(entry);
        }
        self.draining = survivors;
    }

    /// Move buffered stdout lines into the activity ring. Never blocks: only
    /// lines the reader tasks already delivered are consumed.
    fn drain_worker_stdout(&mut self) {
        let mut fresh = Vec::new();
        for worker in self.pool.workers() {
            collect_lines(worker, &mut fresh);
        }
        for entry in &self.draining {
            collect_lines(&entry.worker, &mut fresh);
        }
        for activity in fresh {
            self.push_activity(activity);
        }
    }

    fn flush_worker_stdout(&mut self, worker: &WorkerProcess) {
        let mut fresh = Vec::new();
        collect_lines(worker, &mut fresh);
        for activity in fresh {
            self.push_activity(activity);
        }
    }

    fn push_activity(&mut self, activity: JobActivity) {
        if self.activity.len() == ACTIVITY_CAPACITY {
            self.activity.pop_front();
        }
        self.activity.push_back(activity);
    }

    fn push_scaling_log(&mut self, entry: String) {
        if self.scaling_log.len() == SCALING_LOG_CAPACITY {
            self.scaling_log.pop_front();
        }
        self.scaling_log.push_back(entry);
    }

    /// Assemble this tick's immutable snapshot and hand it to renderers.
    fn publish_snapshot(&mut self) {
        let snapshot = self.build_snapshot();
        let _ = self.snapshot_tx.send(snapshot);
    }

    fn build_snapshot(&self) -> OutputData {
        let queues = self
            .queues
            .iter()
            .filter_map(|q| self.last_queue_stats.get(&q.key()).cloned())
            .collect();

        let mut workers: Vec<WorkerSnapshot> = self
            .pool
            .workers()
            .map(|w| WorkerSnapshot {
                pid: w.pid,
                key: w.key(),
                uptime_seconds: w.uptime().as_secs(),
                running: w.running,
            })
            .collect();
        workers.sort_by_key(|w| w.pid);

        OutputData {
            at: Utc::now(),
            queues,
            workers,
            activity: self.activity.iter().cloned().collect(),
            scaling_log: self.scaling_log.iter().cloned().collect(),
        }
    }

    /// SIGUSR1: log the current state as one JSON line.
    fn dump_snapshot(&self) {
        let snapshot = self.build_snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => tracing::info!(snapshot = %json, "state dump"),
            Err(e) => tracing::error!(error = %e, "state dump failed"),
        }
    }

    /// SIGHUP: reload configuration between ticks. Running workers stay put
    /// unless their queue disappeared, which drains it to zero.
    fn reload_config(&mut self) {
        let Some(path) = self.config_path.clone() else {
            tracing::warn!("reload requested but no configuration path is known");
            return;
        };

        let new_config = match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "configuration reload failed; keeping previous configuration");
                return;
            }
        };

        let new_queues = new_config.queue_configurations();
        if let Err(e) = self.engine.update_configs(&new_queues) {
            tracing::error!(error = %e, "configuration reload failed; keeping previous configuration");
            return;
        }

        let keep: HashSet<QueueKey> = new_queues.iter().map(|q| q.key()).collect();
        let removed: Vec<QueueKey> = self
            .queues
            .iter()
            .map(|q| q.key())
            .filter(|k| !keep.contains(k))
            .collect();
        let deadline = Instant::now() + Duration::from_secs(new_config.grace_period_seconds);
        for key in removed {
            tracing::info!(queue = %key, "queue removed by reload; scaling to zero");
            let victims = self.pool.remove(&key, usize::MAX);
            for victim in victims {
                if let Err(e) = self.launcher.terminate_graceful(&victim) {
                    tracing::warn!(pid = victim.pid, error = %e, "graceful terminate failed; reaper will escalate");
                }
                self.draining.push(DrainingWorker {
                    worker: victim,
                    deadline,
                    forced: false,
                    unreapable_since: None,
                });
            }
            self.last_queue_stats.remove(&key);
            self.sla.remove(&key);
            self.fetch_failures.remove(&key);
            self.degraded.remove(&key);
        }

        self.queues = new_queues;
        self.config = new_config;
        tracing::info!(queues = self.queues.len(), "configuration reloaded");
    }

    /// Graceful stop: SIGTERM everyone, wait out the shutdown deadline, then
    /// SIGKILL survivors.
    async fn shutdown(&mut self) {
        tracing::info!(workers = self.pool.total_count(), "terminating workers");

        let grace = Duration::from_secs(self.config.grace_period_seconds);
        let start = Instant::now();
        for pid in self.pool.pids() {
            if let Some(worker) = self.pool.remove_worker(pid) {
                if let Err(e) = self.launcher.terminate_graceful(&worker) {
                    tracing::warn!(pid, error = %e, "graceful terminate failed");
                }
                self.draining.push(DrainingWorker {
                    worker,
                    deadline: start + grace,
                    forced: false,
                    unreapable_since: None,
                });
            }
        }

        let deadline = start + Duration::from_secs(self.config.shutdown_deadline_seconds);
        while !self.draining.is_empty() && Instant::now() < deadline {
            self.reap_draining(Instant::now());
            if self.draining.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        if !self.draining.is_empty() {
            for entry in &self.draining {
                if self.launcher.is_alive(entry.worker.pid) {
                    let _ = self.launcher.terminate_forceful(&entry.worker);
                }
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
            self.reap_draining(Instant::now());
            for entry in &self.draining {
                tracing::error!(pid = entry.worker.pid, "worker survived forced termination");
            }
            self.draining.clear();
        }

        self.publish_snapshot();
        tracing::info!("supervisor stopped");
    }
}

fn collect_lines(worker: &WorkerProcess, into: &mut Vec<JobActivity>) {
    let Some(rx) = &worker.stdout else {
        return;
    };
    let key = worker.key();
    for _ in 0..MAX_LINES_PER_WORKER_PER_TICK {
        match rx.try_recv() {
            Ok(line) => into.push(parse_activity(worker.pid, &key, &line)),
            Err(_) => break,
        }
    }
}
