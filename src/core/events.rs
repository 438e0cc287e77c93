//! Notifications emitted by list controllers
//!
//! The [`NotificationBus`] uses `tokio::sync::broadcast` to decouple list
//! controllers from whatever shows notifications to the user (toasts, a
//! status bar, logs).
//!
//! ```text
//! RemoteListController ──▶ NotificationBus::publish() ──▶ toast subscriber
//!                                                    ──▶ audit subscriber
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let bus = NotificationBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.publish(ListEvent::FetchFailed {
//!     list: "member_dw_history".to_string(),
//!     seq: 7,
//!     message: "connection reset".to_string(),
//! });
//!
//! if let Ok(envelope) = rx.recv().await {
//!     println!("{}: {:?}", envelope.timestamp, envelope.event);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Something that happened to a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ListEvent {
    /// A fetch resolved and its rows are now displayed
    Loaded {
        list: String,
        seq: u64,
        rows: usize,
        total: u64,
    },
    /// A fetch failed; the previous rows stay on screen
    FetchFailed {
        list: String,
        seq: u64,
        message: String,
    },
}

impl ListEvent {
    pub fn list(&self) -> &str {
        match self {
            ListEvent::Loaded { list, .. } | ListEvent::FetchFailed { list, .. } => list,
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            ListEvent::Loaded { seq, .. } | ListEvent::FetchFailed { seq, .. } => *seq,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ListEvent::FetchFailed { .. })
    }
}

/// Envelope wrapping a list event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: ListEvent,
}

impl NotificationEnvelope {
    pub fn new(event: ListEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based notification bus
///
/// Cheap to clone; all clones share one channel.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<NotificationEnvelope>,
}

impl NotificationBus {
    /// Create a bus buffering up to `capacity` notifications per slow receiver
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all subscribers; returns how many will receive it
    ///
    /// Never fails: without subscribers the notification is dropped.
    pub fn publish(&self, event: ListEvent) -> usize {
        let envelope = NotificationEnvelope::new(event);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Receive every notification published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEnvelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(256)
    }
}
