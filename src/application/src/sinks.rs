use domain::events::{AutoscaleEvent, EventSink};

/// Fan-out of supervisor events to every registered sink, in registration
/// order. Sinks see events in decision order within a tick.
#[derive(Default)]
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn emit(&self, event: &AutoscaleEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

/// Logs every event through `tracing`; breaches log at warn.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &AutoscaleEvent) {
        match event {
            AutoscaleEvent::WorkersScaled {
                key,
                from_workers,
                to_workers,
                action,
                reason,
                ..
            } => {
                tracing::info!(queue = %key, from = from_workers, to = to_workers, %action, %reason, "workers scaled");
            }
            AutoscaleEvent::SlaBreached {
                key,
                oldest_job_age_seconds,
                sla_seconds,
                pending,
                active_workers,
                ..
            } => {
                tracing::warn!(
                    queue = %key,
                    oldest_age = oldest_job_age_seconds,
                    sla = sla_seconds,
                    pending,
                    active_workers,
                    "SLA breached"
                );
            }
            AutoscaleEvent::SlaRecovered {
                key,
                oldest_job_age_seconds,
                sla_seconds,
                ..
            } => {
                tracing::info!(queue = %key, oldest_age = oldest_job_age_seconds, sla = sla_seconds, "SLA recovered");
            }
            AutoscaleEvent::DegradedModeEntered {
                key,
                consecutive_failures,
                ..
            } => {
                tracing::warn!(queue = %key, consecutive_failures, "metrics degraded; holding worker counts");
            }
            AutoscaleEvent::DegradedModeRecovered { key, .. } => {
                tracing::info!(queue = %key, "metrics recovered");
            }
        }
    }
}

/// Forwards events over a channel for external subscribers. A dropped or
/// lagging receiver never blocks the control loop.
pub struct ChannelEventSink {
    tx: flume::Sender<AutoscaleEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, flume::Receiver<AutoscaleEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &AutoscaleEvent) {
        let _ = self.tx.send(event.clone());
    }
}
