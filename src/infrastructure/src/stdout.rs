use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use domain::entities::queue::QueueKey;

/// Accumulates raw stdout chunks and yields complete lines.
///
/// Worker output arrives in arbitrary read-sized pieces; a trailing partial
/// line stays buffered until its newline shows up or the worker dies and the
/// buffer is flushed.
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(newline) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=newline).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Append raw bytes, tolerating invalid UTF-8.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.push(&String::from_utf8_lossy(bytes))
    }

    /// Hand back whatever partial line remains. Used when a worker exits
    /// without terminating its last line.
    pub fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }
}

/// What a worker line meant, as far as we can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobActivityKind {
    Processing,
    Processed,
    Failed,
    Output,
}

/// One parsed line of worker stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobActivity {
    pub pid: u32,
    pub key: QueueKey,
    pub kind: JobActivityKind,
    /// Job identifier or class when the line carried one.
    pub job: Option<String>,
    pub line: String,
    pub at: DateTime<Utc>,
}

/// Parse a worker stdout line into a [`JobActivity`].
///
/// Workers announce job transitions as `Processing: <job>`,
/// `Processed: <job>` and `Failed: <job>`; anything else is carried through
/// as plain output so operators still see it on the dashboard.
pub fn parse_activity(pid: u32, key: &QueueKey, line: &str) -> JobActivity {
    let trimmed = line.trim();
    let (kind, job) = if let Some(rest) = trimmed.strip_prefix("Processing:") {
        (JobActivityKind::Processing, Some(rest.trim().to_string()))
    } else if let Some(rest) = trimmed.strip_prefix("Processed:") {
        (JobActivityKind::Processed, Some(rest.trim().to_string()))
    } else if let Some(rest) = trimmed.strip_prefix("Failed:") {
        (JobActivityKind::Failed, Some(rest.trim().to_string()))
    } else {
        (JobActivityKind::Output, None)
    };

    JobActivity {
        pid,
        key: key.clone(),
        kind,
        job: job.filter(|j| !j.is_empty()),
        line: trimmed.to_string(),
        at: Utc::now(),
    }
}
