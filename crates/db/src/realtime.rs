use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Agents,
    KeyFeatures,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agents => "agents",
            Self::KeyFeatures => "key_features",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Which change kinds a subscription wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventMask {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl EventMask {
    pub const ALL: EventMask = EventMask { insert: true, update: true, delete: true };

    pub fn only(kind: ChangeKind) -> Self {
        Self {
            insert: kind == ChangeKind::Insert,
            update: kind == ChangeKind::Update,
            delete: kind == ChangeKind::Delete,
        }
    }

    pub fn matches(self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Insert => self.insert,
            ChangeKind::Update => self.update,
            ChangeKind::Delete => self.delete,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row_id: String,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, row_id: impl Into<String>) -> Self {
        Self { table, kind, row_id: row_id.into(), at: Utc::now() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    Change(ChangeEvent),
    /// Events were dropped because the subscriber fell behind. Treat the
    /// whole table as changed.
    Resync,
}

/// In-process change feed. Every repository write publishes here.
#[derive(Clone, Debug)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
    active: Arc<AtomicUsize>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, active: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn publish(&self, event: ChangeEvent) {
        debug!(
            event_name = "db.change.published",
            table = event.table.as_str(),
            kind = ?event.kind,
            row_id = %event.row_id,
            "change published"
        );
        // No receivers is not an error: nobody is watching.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self, table: Table, mask: EventMask) -> Subscription {
        self.active.fetch_add(1, Ordering::SeqCst);
        Subscription {
            receiver: self.sender.subscribe(),
            table,
            mask,
            active: Arc::clone(&self.active),
        }
    }

    /// Subscriptions currently held open.
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Live interest in one table. Released when dropped.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    table: Table,
    mask: EventMask,
    active: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn table(&self) -> Table {
        self.table
    }

    /// Waits for the next matching change. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.table == self.table && self.mask.matches(event.kind) => {
                    return Some(Notification::Change(event));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        event_name = "db.change.lagged",
                        table = self.table.as_str(),
                        skipped,
                        "subscriber fell behind; requesting resync"
                    );
                    return Some(Notification::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
