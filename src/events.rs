//! Change notification for the presentation layer.
//!
//! Delivery is best-effort and at-least-once: a subscriber that fails is
//! logged and skipped, and consumers are expected to fall back to a full
//! re-list when they suspect a gap.

use std::io::Write;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::model::mail::{Folder, MailRecord};

/// Kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    RecordAdded,
    RecordChanged,
    RecordMoved,
    RecordAssigned,
}

impl EventKind {
    /// Event name understood by the dashboard.
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::RecordAdded => "newMailsDetected",
            Self::RecordChanged => "mailsUpdated",
            Self::RecordMoved => "mailMoved",
            Self::RecordAssigned => "mailAssigned",
        }
    }
}

/// One published change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub record_ids: Vec<String>,
    pub payload: serde_json::Value,
}

impl ChangeEvent {
    pub fn new(kind: EventKind, record_ids: Vec<String>, payload: serde_json::Value) -> Self {
        Self {
            kind,
            record_ids,
            payload,
        }
    }

    pub fn added(record: &MailRecord) -> Self {
        Self::new(
            EventKind::RecordAdded,
            vec![record.id.clone()],
            json!({
                "id": record.id,
                "subject": record.subject,
                "from": record.sender,
                "folder": record.folder.to_string(),
                "filePath": record.file_path,
            }),
        )
    }

    pub fn changed(record: &MailRecord) -> Self {
        Self::new(
            EventKind::RecordChanged,
            vec![record.id.clone()],
            json!({
                "id": record.id,
                "folder": record.folder.to_string(),
                "isReplied": record.is_replied(),
                "originalCategory": record.original_category,
            }),
        )
    }

    /// A mail file disappeared from every state folder. The record is gone,
    /// so `id` is the file stem and `fileName` is the authoritative key.
    pub fn removed(file_name: &str) -> Self {
        let id = file_name.strip_suffix(".json").unwrap_or(file_name);
        Self::new(
            EventKind::RecordChanged,
            vec![id.to_string()],
            json!({ "id": id, "fileName": file_name, "removed": true }),
        )
    }

    pub fn moved(record: &MailRecord, from: Folder) -> Self {
        Self::new(
            EventKind::RecordMoved,
            vec![record.id.clone()],
            json!({
                "id": record.id,
                "from": from.to_string(),
                "to": record.folder.to_string(),
                "filePath": record.file_path,
            }),
        )
    }

    pub fn assigned(record: &MailRecord) -> Self {
        Self::new(
            EventKind::RecordAssigned,
            vec![record.id.clone()],
            json!({
                "id": record.id,
                "assignedTo": record.assignment,
            }),
        )
    }
}

/// Receives published events.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()>;
}

impl<F> Subscriber for F
where
    F: Fn(&ChangeEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Forwards events into a channel.
pub struct ChannelSubscriber(Mutex<Sender<ChangeEvent>>);

impl ChannelSubscriber {
    pub fn new(tx: Sender<ChangeEvent>) -> Self {
        Self(Mutex::new(tx))
    }
}

impl Subscriber for ChannelSubscriber {
    fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self.0
            .lock()
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }
}

/// Writes `{"event": "<wire name>", "data": {...}}` lines.
pub struct JsonLinesSubscriber<W: Write + Send>(Mutex<W>);

impl<W: Write + Send> JsonLinesSubscriber<W> {
    pub fn new(writer: W) -> Self {
        Self(Mutex::new(writer))
    }
}

impl<W: Write + Send> Subscriber for JsonLinesSubscriber<W> {
    fn deliver(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        let line = json!({
            "event": event.kind.wire_name(),
            "ids": event.record_ids,
            "data": event.payload,
        });
        let mut out = self.0.lock();
        serde_json::to_writer(&mut *out, &line)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

/// Fan-out of change events. Holds nothing but the subscriber list.
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `kind` with `payload` for `record_ids`.
    pub fn publish(&self, kind: EventKind, record_ids: Vec<String>, payload: serde_json::Value) {
        self.emit(ChangeEvent::new(kind, record_ids, payload));
    }

    /// Deliver a prepared event to every subscriber.
    pub fn emit(&self, event: ChangeEvent) {
        debug!(event = event.kind.wire_name(), ids = ?event.record_ids, "Publishing change");
        // Clone the list so a slow subscriber never blocks `subscribe`.
        let subscribers: Vec<Arc<dyn Subscriber>> = self.subscribers.read().clone();
        for subscriber in subscribers {
            if let Err(e) = subscriber.deliver(&event) {
                warn!(event = event.kind.wire_name(), error = %e, "Event delivery failed");
            }
        }
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_wire_names() {
        assert_eq!(EventKind::RecordAdded.wire_name(), "newMailsDetected");
        assert_eq!(EventKind::RecordChanged.wire_name(), "mailsUpdated");
        assert_eq!(EventKind::RecordMoved.wire_name(), "mailMoved");
        assert_eq!(EventKind::RecordAssigned.wire_name(), "mailAssigned");
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let notifier = ChangeNotifier::new();
        let (tx, rx) = mpsc::channel();
        notifier.subscribe(Arc::new(|_: &ChangeEvent| -> anyhow::Result<()> {
            anyhow::bail!("socket closed")
        }));
        notifier.subscribe(Arc::new(ChannelSubscriber::new(tx)));

        notifier.publish(EventKind::RecordChanged, vec!["m1".into()], json!({"id": "m1"}));

        let got = rx.try_recv().expect("delivered");
        assert_eq!(got.record_ids, vec!["m1".to_string()]);
        assert_eq!(notifier.subscriber_count(), 2);
    }

    #[test]
    fn test_json_lines_format() {
        let sub = JsonLinesSubscriber::new(Vec::new());
        sub.deliver(&ChangeEvent::removed("m7.json")).expect("deliver");
        let bytes = sub.0.into_inner();
        let line: serde_json::Value =
            serde_json::from_slice(bytes.trim_ascii_end()).expect("json line");
        assert_eq!(line["event"], "mailsUpdated");
        assert_eq!(line["data"]["removed"], true);
        assert_eq!(line["ids"][0], "m7");
        assert_eq!(line["data"]["fileName"], "m7.json");
    }
}
