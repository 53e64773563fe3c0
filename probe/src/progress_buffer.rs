//! Per-job throttled progress emitter (spec §4.C).
//!
//! One struct, one `Mode` enum, three branch points, per the spec's own
//! design-notes guidance (§9) rather than three near-duplicate types.

use common::ProgressFrame;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Pushed fields are concatenated onto the accumulated value.
    Append,
    /// Pushed fields replace the accumulated value; only the new suffix is
    /// emitted, tracked per-field by an emitted-length offset.
    Diff,
    /// Pushed fields replace the accumulated value; the whole value is
    /// re-emitted every time with `overwrite: true`.
    Overwrite,
}

struct FieldState {
    value: String,
    /// Diff mode only: how many bytes of `value` have already been emitted.
    emitted_len: usize,
}

/// Coalesces bursts of `push_progress` calls into at most one outbound
/// frame per [`PROGRESS_INTERVAL`], with the very first push flushed
/// immediately for responsiveness (spec §4.C "first-message flush").
pub struct ProgressBuffer {
    test_id: String,
    measurement_id: String,
    mode: Mode,
    sink: UnboundedSender<ProgressFrame>,
    fields: parking_lot::Mutex<BTreeMap<String, FieldState>>,
    emitted_once: std::sync::atomic::AtomicBool,
    pending: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
    done: std::sync::atomic::AtomicBool,
}

impl ProgressBuffer {
    pub fn new(
        test_id: String,
        measurement_id: String,
        mode: Mode,
        sink: UnboundedSender<ProgressFrame>,
    ) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            test_id,
            measurement_id,
            mode,
            sink,
            fields: parking_lot::Mutex::new(BTreeMap::new()),
            emitted_once: std::sync::atomic::AtomicBool::new(false),
            pending: parking_lot::Mutex::new(None),
            done: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Push an update for one or more named fields of the progress payload.
    pub fn push_progress(self: &std::sync::Arc<Self>, fields: Vec<(&str, String)>) {
        if self.done.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        {
            let mut guard = self.fields.lock();
            for (name, value) in fields {
                let entry = guard.entry(name.to_string()).or_insert_with(|| FieldState {
                    value: String::new(),
                    emitted_len: 0,
                });
                match self.mode {
                    Mode::Append => entry.value.push_str(&value),
                    Mode::Diff | Mode::Overwrite => entry.value = value,
                }
            }
        }

        if !self.emitted_once.load(std::sync::atomic::Ordering::SeqCst) {
            self.flush_now();
            return;
        }

        let mut pending = self.pending.lock();
        if pending.is_some() {
            return;
        }
        let this = self.clone();
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(Instant::now() + PROGRESS_INTERVAL).await;
            this.pending.lock().take();
            this.flush_now();
        }));
    }

    fn flush_now(self: &std::sync::Arc<Self>) {
        if self.done.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let mut guard = self.fields.lock();
        let mut payload = serde_json::Map::new();
        let mut any = false;
        for (name, state) in guard.iter_mut() {
            match self.mode {
                Mode::Append | Mode::Overwrite => {
                    if state.value.is_empty() {
                        continue;
                    }
                    payload.insert(name.clone(), serde_json::Value::String(state.value.clone()));
                    any = true;
                }
                Mode::Diff => {
                    if state.emitted_len >= state.value.len() {
                        continue;
                    }
                    let suffix = &state.value[state.emitted_len..];
                    if suffix.is_empty() {
                        continue;
                    }
                    payload.insert(name.clone(), serde_json::Value::String(suffix.to_string()));
                    state.emitted_len = state.value.len();
                    any = true;
                }
            }
        }
        drop(guard);

        if !any {
            return;
        }

        self.emitted_once
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let frame = ProgressFrame {
            test_id: self.test_id.clone(),
            measurement_id: self.measurement_id.clone(),
            overwrite: matches!(self.mode, Mode::Overwrite).then_some(true),
            result: serde_json::Value::Object(payload),
        };
        let _ = self.sink.send(frame);
    }

    /// Cancel any pending timer without flushing. The result frame is
    /// authoritative; a buffered-but-unflushed progress update is dropped.
    pub fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
        self.done.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness(mode: Mode) -> (std::sync::Arc<ProgressBuffer>, tokio::sync::mpsc::UnboundedReceiver<ProgressFrame>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let buf = ProgressBuffer::new("t1".into(), "m1".into(), mode, tx);
        (buf, rx)
    }

    #[tokio::test]
    async fn first_push_flushes_immediately() {
        let (buf, mut rx) = harness(Mode::Append);
        buf.push_progress(vec![("rawOutput", "hello".into())]);
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.result["rawOutput"], "hello");
    }

    #[tokio::test]
    async fn append_mode_concatenates_and_coalesces() {
        let (buf, mut rx) = harness(Mode::Append);
        buf.push_progress(vec![("rawOutput", "a".into())]);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.result["rawOutput"], "a");

        buf.push_progress(vec![("rawOutput", "b".into())]);
        buf.push_progress(vec![("rawOutput", "c".into())]);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.result["rawOutput"], "abc");
    }

    #[tokio::test]
    async fn diff_mode_emits_only_suffix() {
        let (buf, mut rx) = harness(Mode::Diff);
        buf.push_progress(vec![("rawOutput", "hello".into())]);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.result["rawOutput"], "hello");

        buf.push_progress(vec![("rawOutput", "hello world".into())]);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.result["rawOutput"], " world");
        assert!(second.overwrite.is_none());
    }

    #[tokio::test]
    async fn overwrite_mode_marks_frame_and_never_emits_when_empty() {
        let (buf, mut rx) = harness(Mode::Overwrite);
        buf.push_progress(vec![("table", "".into())]);
        // empty accumulator: no frame should ever be sent
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        buf.push_progress(vec![("table", "row1".into())]);
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.overwrite, Some(true));
        assert_eq!(frame.result["table"], "row1");
    }

    #[tokio::test]
    async fn cancel_pending_drops_buffered_update() {
        let (buf, mut rx) = harness(Mode::Append);
        buf.push_progress(vec![("rawOutput", "a".into())]);
        rx.recv().await.unwrap();
        buf.push_progress(vec![("rawOutput", "b".into())]);
        buf.cancel_pending();
        tokio::time::sleep(PROGRESS_INTERVAL + Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
