use chrono::{DateTime, Utc};
use shared::error::{Error, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use domain::entities::queue::QueueKey;

/// A live (or recently deceased, not yet reaped) worker child process.
///
/// Owned exclusively by the [`WorkerPool`]; the supervisor borrows read
/// access and takes ownership back only when a worker is removed.
pub struct WorkerProcess {
    pub pid: u32,
    pub connection: String,
    pub queue: String,
    pub spawned_at: Instant,
    pub started_at: DateTime<Utc>,
    /// Cleared by the reaper once the OS process is gone.
    pub running: bool,
    /// Complete stdout lines, fed by the launcher's reader task.
    pub stdout: Option<flume::Receiver<String>>,
}

impl WorkerProcess {
    pub fn new(
        pid: u32,
        connection: impl Into<String>,
        queue: impl Into<String>,
        stdout: Option<flume::Receiver<String>>,
    ) -> Self {
        Self {
            pid,
            connection: connection.into(),
            queue: queue.into(),
            spawned_at: Instant::now(),
            started_at: Utc::now(),
            running: true,
            stdout,
        }
    }

    pub fn key(&self) -> QueueKey {
        QueueKey::new(self.connection.clone(), self.queue.clone())
    }

    pub fn uptime(&self) -> Duration {
        self.spawned_at.elapsed()
    }
}

/// In-memory registry of worker processes.
///
/// Two views over the same entries: a pid map and a per-queue index. Every
/// mutation maintains both, so a pid present in one is always present in the
/// other. Not thread-safe on purpose; only the supervisor's control task
/// touches it.
#[derive(Default)]
pub struct WorkerPool {
    workers: HashMap<u32, WorkerProcess>,
    index: HashMap<QueueKey, Vec<u32>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker. Fails if the pid is already tracked.
    pub fn add(&mut self, worker: WorkerProcess) -> Result<()> {
        if self.workers.contains_key(&worker.pid) {
            return Err(Error::DuplicatePid(worker.pid));
        }
        self.index.entry(worker.key()).or_default().push(worker.pid);
        self.workers.insert(worker.pid, worker);
        Ok(())
    }

    /// Register a batch; stops at the first duplicate pid.
    pub fn add_many(&mut self, workers: Vec<WorkerProcess>) -> Result<()> {
        for worker in workers {
            self.add(worker)?;
        }
        Ok(())
    }

    /// Pull up to `count` running workers for a queue, longest uptime first.
    ///
    /// The returned workers are no longer tracked; the caller is responsible
    /// for actually terminating their processes.
    pub fn remove(&mut self, key: &QueueKey, count: usize) -> Vec<WorkerProcess> {
        let mut candidates: Vec<u32> = self
            .index
            .get(key)
            .map(|pids| {
                pids.iter()
                    .copied()
                    .filter(|pid| self.workers.get(pid).map(|w| w.running).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default();

        candidates.sort_by_key(|pid| self.workers[pid].spawned_at);
        candidates.truncate(count);

        candidates
            .into_iter()
            .filter_map(|pid| self.remove_worker(pid))
            .collect()
    }

    /// Remove a single worker by pid, returning ownership of its entry.
    pub fn remove_worker(&mut self, pid: u32) -> Option<WorkerProcess> {
        let worker = self.workers.remove(&pid)?;
        if let Some(pids) = self.index.get_mut(&worker.key()) {
            pids.retain(|p| *p != pid);
            if pids.is_empty() {
                self.index.remove(&worker.key());
            }
        }
        Some(worker)
    }

    /// Running workers for a queue.
    pub fn count(&self, key: &QueueKey) -> usize {
        self.index
            .get(key)
            .map(|pids| {
                pids.iter()
                    .filter(|pid| self.workers.get(pid).map(|w| w.running).unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Running workers across every queue.
    pub fn total_count(&self) -> usize {
        self.workers.values().filter(|w| w.running).count()
    }

    /// Workers whose process has exited but whose slot is still tracked.
    pub fn dead_workers(&self) -> Vec<&WorkerProcess> {
        self.workers.values().filter(|w| !w.running).collect()
    }

    /// Every tracked worker for a queue, running or not.
    pub fn by_connection(&self, key: &QueueKey) -> Vec<&WorkerProcess> {
        self.index
            .get(key)
            .map(|pids| pids.iter().filter_map(|pid| self.workers.get(pid)).collect())
            .unwrap_or_default()
    }

    /// Flag a worker as dead. Idempotent; unknown pids are ignored.
    pub fn mark_dead(&mut self, pid: u32) {
        if let Some(worker) = self.workers.get_mut(&pid) {
            worker.running = false;
        }
    }

    pub fn get(&self, pid: u32) -> Option<&WorkerProcess> {
        self.workers.get(&pid)
    }

    pub fn pids(&self) -> Vec<u32> {
        self.workers.keys().copied().collect()
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerProcess> {
        self.workers.values()
    }

    /// Drop every entry without touching the underlying processes.
    pub fn reset(&mut self) {
        self.workers.clear();
        self.index.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> QueueKey {
        QueueKey::new("redis", "default")
    }

    fn worker(pid: u32) -> WorkerProcess {
        WorkerProcess::new(pid, "redis", "default", None)
    }

    #[test]
    fn duplicate_pid_is_rejected() {
        let mut pool = WorkerPool::new();
        pool.add(worker(1)).unwrap();
        match pool.add(worker(1)) {
            Err(Error::DuplicatePid(1)) => {}
            other => panic!("expected duplicate pid error, got {:?}", other),
        }
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn count_tracks_running_only() {
        let mut pool = WorkerPool::new();
        pool.add_many(vec![worker(1), worker(2), worker(3)]).unwrap();
        assert_eq!(pool.count(&key()), 3);

        pool.mark_dead(2);
        assert_eq!(pool.count(&key()), 2);
        assert_eq!(pool.total_count(), 2);
        assert_eq!(pool.by_connection(&key()).len(), 3);
    }

    #[test]
    fn dead_workers_are_disjoint_from_running() {
        let mut pool = WorkerPool::new();
        pool.add_many(vec![worker(1), worker(2)]).unwrap();
        pool.mark_dead(1);

        let dead: Vec<u32> = pool.dead_workers().iter().map(|w| w.pid).collect();
        assert_eq!(dead, vec![1]);
        assert_eq!(pool.count(&key()), 1);
    }

    #[test]
    fn remove_prefers_longest_uptime() {
        let mut pool = WorkerPool::new();
        let now = Instant::now();
        for (pid, age_secs) in [(1u32, 300u64), (2, 600), (3, 30)] {
            let mut w = worker(pid);
            w.spawned_at = now - Duration::from_secs(age_secs);
            pool.add(w).unwrap();
        }

        let victims: Vec<u32> = pool.remove(&key(), 2).iter().map(|w| w.pid).collect();
        assert_eq!(victims, vec![2, 1]);
        assert_eq!(pool.count(&key()), 1);
    }

    #[test]
    fn remove_skips_dead_workers() {
        let mut pool = WorkerPool::new();
        pool.add_many(vec![worker(1), worker(2)]).unwrap();
        pool.mark_dead(1);

        let victims: Vec<u32> = pool.remove(&key(), 2).iter().map(|w| w.pid).collect();
        assert_eq!(victims, vec![2]);
        // The dead entry remains for the reaper.
        assert_eq!(pool.dead_workers().len(), 1);
    }

    #[test]
    fn add_then_remove_restores_the_pool() {
        let mut pool = WorkerPool::new();
        pool.add(worker(7)).unwrap();

        let removed = pool.remove_worker(7).unwrap();
        assert_eq!(removed.pid, 7);
        assert!(pool.is_empty());
        assert_eq!(pool.count(&key()), 0);
        assert!(pool.by_connection(&key()).is_empty());
    }

    #[test]
    fn queues_are_isolated() {
        let mut pool = WorkerPool::new();
        pool.add(worker(1)).unwrap();
        pool.add(WorkerProcess::new(2, "redis", "mail", None)).unwrap();

        assert_eq!(pool.count(&key()), 1);
        assert_eq!(pool.count(&QueueKey::new("redis", "mail")), 1);

        let victims = pool.remove(&key(), 10);
        assert_eq!(victims.len(), 1);
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn reset_forgets_everything() {
        let mut pool = WorkerPool::new();
        pool.add_many(vec![worker(1), worker(2)]).unwrap();
        pool.reset();
        assert!(pool.is_empty());
        assert_eq!(pool.total_count(), 0);
    }
}
