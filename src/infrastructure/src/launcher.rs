use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use shared::error::{Error, Result};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::config::WorkerCommandConfig;
use crate::pool::WorkerProcess;
use crate::stdout::LineBuffer;

use domain::entities::queue::QueueConfiguration;

/// Spawns and terminates worker OS processes.
///
/// `spawn` reports per-slot results so a partial failure still hands the
/// successful workers to the pool. Termination is split into a graceful
/// SIGTERM and a forceful SIGKILL; the supervisor escalates between them.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn spawn(&self, config: &QueueConfiguration, count: usize) -> Vec<Result<WorkerProcess>>;

    fn terminate_graceful(&self, worker: &WorkerProcess) -> Result<()>;

    fn terminate_forceful(&self, worker: &WorkerProcess) -> Result<()>;

    fn is_alive(&self, pid: u32) -> bool;
}

/// Default launcher: runs the configured worker binary as
/// `<command> work <connection> --queue=<queue> --tries=N --max-time=T --sleep=S`.
///
/// Each child's stdout is piped into a reader task that assembles complete
/// lines and feeds them to the worker's line channel; the supervisor drains
/// that channel without ever blocking on the pipe itself.
pub struct CommandLauncher {
    worker: WorkerCommandConfig,
    children: Mutex<HashMap<u32, Child>>,
}

impl CommandLauncher {
    pub fn new(worker: WorkerCommandConfig) -> Self {
        Self {
            worker,
            children: Mutex::new(HashMap::new()),
        }
    }

    fn spawn_one(&self, config: &QueueConfiguration) -> Result<WorkerProcess> {
        let mut command = Command::new(&self.worker.command);
        command
            .arg("work")
            .arg(&config.connection)
            .arg(format!("--queue={}", config.queue))
            .arg(format!("--tries={}", self.worker.tries))
            .arg(format!("--max-time={}", self.worker.timeout_seconds))
            .arg(format!("--sleep={}", self.worker.sleep_seconds))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Spawn(format!("{} for {}: {}", self.worker.command, config.key(), e)))?;

        let pid = child.id().ok_or_else(|| {
            Error::Spawn(format!("worker for {} exited before it got a pid", config.key()))
        })?;

        let (line_tx, line_rx) = flume::unbounded();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_lines(stdout, line_tx));
        }

        self.children
            .lock()
            .expect("child table poisoned")
            .insert(pid, child);

        tracing::debug!(pid, queue = %config.key(), "spawned worker");
        Ok(WorkerProcess::new(
            pid,
            config.connection.clone(),
            config.queue.clone(),
            Some(line_rx),
        ))
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        match kill(Pid::from_raw(pid as i32), signal) {
            Ok(()) => Ok(()),
            // Already gone is success as far as termination goes.
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::Reap(format!("signal {} to pid {}: {}", signal, pid, e))),
        }
    }
}

/// Pump a child's stdout into its line channel, flushing any unterminated
/// tail when the pipe closes.
async fn read_lines(mut stdout: tokio::process::ChildStdout, tx: flume::Sender<String>) {
    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for line in buffer.push_bytes(&chunk[..n]) {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
            }
            Err(_) => break,
        }
    }
    if let Some(tail) = buffer.flush() {
        let _ = tx.send(tail);
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn spawn(&self, config: &QueueConfiguration, count: usize) -> Vec<Result<WorkerProcess>> {
        (0..count).map(|_| self.spawn_one(config)).collect()
    }

    fn terminate_graceful(&self, worker: &WorkerProcess) -> Result<()> {
        tracing::debug!(pid = worker.pid, queue = %worker.key(), "sending SIGTERM");
        self.signal(worker.pid, Signal::SIGTERM)
    }

    fn terminate_forceful(&self, worker: &WorkerProcess) -> Result<()> {
        tracing::warn!(pid = worker.pid, queue = %worker.key(), "sending SIGKILL");
        self.signal(worker.pid, Signal::SIGKILL)
    }

    fn is_alive(&self, pid: u32) -> bool {
        let mut children = self.children.lock().expect("child table poisoned");
        if let Some(child) = children.get_mut(&pid) {
            return match child.try_wait() {
                // Still running.
                Ok(None) => true,
                Ok(Some(status)) => {
                    tracing::debug!(pid, %status, "worker exited");
                    children.remove(&pid);
                    false
                }
                Err(e) => {
                    tracing::warn!(pid, error = %e, "try_wait failed; treating worker as dead");
                    children.remove(&pid);
                    false
                }
            };
        }
        // Not one of ours (or already reaped): probe with signal 0.
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn queue_config() -> QueueConfiguration {
        QueueConfiguration {
            connection: "redis".to_string(),
            queue: "default".to_string(),
            sla_seconds: 30.0,
            min_workers: 0,
            max_workers: 5,
            strategy: "reactive".to_string(),
            cooldown_up_seconds: 60,
            cooldown_down_seconds: 120,
            hysteresis_delta: 2,
            hysteresis_fraction: 0.2,
            max_step_up: 0,
            max_step_down: 0,
            drain_horizon_seconds: 0.0,
            predict_lookahead_seconds: 30.0,
            trend_samples: 10,
            pending_threshold: 0,
            warn_fraction: 0.8,
            recovery_factor: 0.8,
            default_job_duration_seconds: 1.0,
        }
    }

    #[tokio::test]
    async fn spawn_failure_reports_per_slot() {
        let launcher = CommandLauncher::new(WorkerCommandConfig {
            command: "/nonexistent/worker-binary".to_string(),
            ..WorkerCommandConfig::default()
        });
        let results = launcher.spawn(&queue_config(), 2).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| matches!(r, Err(Error::Spawn(_)))));
    }

    #[tokio::test]
    async fn short_lived_worker_streams_stdout_and_dies() {
        // `echo` prints its argv on one line and exits immediately.
        let launcher = CommandLauncher::new(WorkerCommandConfig {
            command: "echo".to_string(),
            ..WorkerCommandConfig::default()
        });
        let mut results = launcher.spawn(&queue_config(), 1).await;
        let worker = results.remove(0).unwrap();

        let stdout = worker.stdout.clone().unwrap();
        let line = tokio::time::timeout(Duration::from_secs(5), stdout.recv_async())
            .await
            .expect("stdout line within deadline")
            .expect("one line of output");
        assert!(line.contains("--queue=default"));

        // The process exits on its own; is_alive observes and reaps it.
        let mut alive = true;
        for _ in 0..50 {
            alive = launcher.is_alive(worker.pid);
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!alive);
    }

    #[tokio::test]
    async fn graceful_termination_kills_a_sleeper() {
        let launcher = CommandLauncher::new(WorkerCommandConfig {
            command: "sleep".to_string(),
            tries: 1,
            timeout_seconds: 60,
            sleep_seconds: 3,
        });
        // `sleep` treats "work" as an invalid interval on some systems and a
        // huge one on none; either way SIGTERM must take it down.
        let mut results = launcher.spawn(&queue_config(), 1).await;
        let worker = results.remove(0).unwrap();

        launcher.terminate_graceful(&worker).unwrap();
        let mut alive = true;
        for _ in 0..50 {
            alive = launcher.is_alive(worker.pid);
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!alive);

        // Terminating an already-dead worker is not an error.
        launcher.terminate_forceful(&worker).unwrap();
    }
}
