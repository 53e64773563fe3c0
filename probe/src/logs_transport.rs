//! API-Logs Transport (spec §4.H): generalizes the teacher's fixed-capacity
//! ring-buffer tracing layer (which only supported local export) into one
//! with `droppedLogs` tracking, ack-driven flush reconciliation, and dynamic
//! reconfiguration.

use common::{LogRecord, LogsPayload};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const MAX_MESSAGE_LEN: usize = 500;
const DEFAULT_MAX_BUFFER: usize = 100;
const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(10);

struct Inner {
    entries: VecDeque<LogRecord>,
    max_buffer_size: usize,
    send_interval: Duration,
    is_active: bool,
}

/// Shared log ring buffer; cheap to clone (wraps an `Arc` internally via
/// `parking_lot::Mutex` living behind whatever owner holds it).
pub struct LogsTransport {
    inner: Mutex<Inner>,
    dropped_logs: AtomicU64,
    connected: AtomicBool,
}

impl LogsTransport {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(DEFAULT_MAX_BUFFER),
                max_buffer_size: DEFAULT_MAX_BUFFER,
                send_interval: DEFAULT_SEND_INTERVAL,
                is_active: true,
            }),
            dropped_logs: AtomicU64::new(0),
            connected: AtomicBool::new(false),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn update_settings(&self, is_active: Option<bool>, send_interval: Option<Duration>, max_buffer_size: Option<usize>) {
        let mut inner = self.inner.lock();
        if let Some(v) = is_active {
            inner.is_active = v;
        }
        if let Some(v) = send_interval {
            inner.send_interval = v;
        }
        if let Some(v) = max_buffer_size {
            inner.max_buffer_size = v;
            while inner.entries.len() > inner.max_buffer_size {
                inner.entries.pop_front();
                self.dropped_logs.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub fn push(&self, level: &str, scope: &str, message: String) {
        let message = truncate(message);
        let timestamp = chrono::Utc::now().to_rfc3339();
        let mut inner = self.inner.lock();
        if inner.entries.len() >= inner.max_buffer_size {
            inner.entries.pop_front();
            self.dropped_logs.fetch_add(1, Ordering::SeqCst);
        }
        inner.entries.push_back(LogRecord {
            message,
            timestamp,
            level: level.to_string(),
            scope: scope.to_string(),
        });
    }

    fn is_active(&self) -> bool {
        self.inner.lock().is_active
    }

    pub fn send_interval(&self) -> Duration {
        self.inner.lock().send_interval
    }

    /// Snapshots the current buffer for a flush attempt, if one is due:
    /// active, connected, and non-empty. Returns the payload plus the
    /// `droppedLogs` count observed at send time (needed to compute
    /// `droppedWhileAwaiting` on ack).
    pub fn snapshot(&self) -> Option<(LogsPayload, u64)> {
        if !self.is_active() || !self.connected.load(Ordering::SeqCst) {
            return None;
        }
        let inner = self.inner.lock();
        if inner.entries.is_empty() {
            return None;
        }
        let logs: Vec<LogRecord> = inner.entries.iter().cloned().collect();
        let dropped_at_send = self.dropped_logs.load(Ordering::SeqCst);
        Some((
            LogsPayload {
                logs,
                skipped: dropped_at_send,
            },
            dropped_at_send,
        ))
    }

    /// Server acked `"success"`: splice off `presentInPayload -
    /// droppedWhileAwaiting` from the head, clamped to zero (spec §9 design
    /// notes), and fold `droppedWhileAwaiting` into the running counter
    /// reset.
    pub fn reconcile_ack(&self, present_in_payload: usize, dropped_at_send: u64) {
        let dropped_now = self.dropped_logs.load(Ordering::SeqCst);
        let dropped_while_awaiting = dropped_now.saturating_sub(dropped_at_send);
        let to_remove = (present_in_payload as u64).saturating_sub(dropped_while_awaiting);
        let mut inner = self.inner.lock();
        for _ in 0..to_remove.min(inner.entries.len() as u64) {
            inner.entries.pop_front();
        }
        drop(inner);
        self.dropped_logs.store(dropped_while_awaiting, Ordering::SeqCst);
    }
}

fn truncate(message: String) -> String {
    if message.chars().count() <= MAX_MESSAGE_LEN {
        message
    } else {
        let mut s: String = message.chars().take(MAX_MESSAGE_LEN).collect();
        s.push_str("...");
        s
    }
}

/// Tracing layer draining every event into a [`LogsTransport`] so every
/// `tracing::info!`/`warn!`/`error!` call site is automatically shipped to
/// the control plane.
pub struct LogsLayer {
    transport: std::sync::Arc<LogsTransport>,
}

impl LogsLayer {
    pub fn new(transport: std::sync::Arc<LogsTransport>) -> Self {
        Self { transport }
    }
}

impl<S: tracing::Subscriber> Layer<S> for LogsLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = metadata.level().to_string();
        let scope = metadata.target().to_string();

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.transport.push(&level, &scope, visitor.message);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            if !self.message.is_empty() {
                self.message.push_str(", ");
            }
            self.message.push_str(&format!("{} = {:?}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_increments_dropped_logs() {
        let t = LogsTransport::new();
        t.update_settings(None, None, Some(2));
        t.push("INFO", "x", "a".into());
        t.push("INFO", "x", "b".into());
        t.push("INFO", "x", "c".into());
        assert_eq!(t.dropped_logs.load(Ordering::SeqCst), 1);
        assert_eq!(t.inner.lock().entries.len(), 2);
    }

    #[test]
    fn snapshot_empty_or_inactive_is_none() {
        let t = LogsTransport::new();
        t.set_connected(true);
        assert!(t.snapshot().is_none());
        t.push("INFO", "x", "a".into());
        t.set_connected(false);
        assert!(t.snapshot().is_none());
    }

    #[test]
    fn reconcile_ack_removes_only_unevicted_head() {
        let t = LogsTransport::new();
        t.set_connected(true);
        t.push("INFO", "x", "a".into());
        t.push("INFO", "x", "b".into());
        let (_, dropped_at_send) = t.snapshot().unwrap();
        t.reconcile_ack(2, dropped_at_send);
        assert!(t.inner.lock().entries.is_empty());
    }

    #[test]
    fn message_over_limit_is_truncated() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 50);
        let t = truncate(long);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), MAX_MESSAGE_LEN + 3);
    }
}
