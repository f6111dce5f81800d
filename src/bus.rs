//! Notification bus: small, metadata-only coordination messages.
//!
//! The bus carries status events between workers and the coordinator.
//! It never carries bulk data: summaries are capped at a configured size
//! and anything larger must travel as an artifact reference. The cap is
//! enforced by validation at send time, not by convention.
//!
//! Delivery order is preserved per sender-to-recipient pair: every
//! recipient owns a single mpsc inbox and every sender awaits each send,
//! so one sender's notifications arrive in the order they were sent.
//! There is no cross-sender ordering guarantee. Broadcast delivers to the
//! explicit subscriber list of the notification's kind and is reserved
//! for team-wide control events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::artifact::ArtifactKey;
use crate::core::task::TaskId;
use crate::error::{Error, Result};
use crate::orchestration::worker::WorkerId;

/// Bounded capacity of each recipient inbox.
const INBOX_CAPACITY: usize = 100;

/// The kind of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// A task finished successfully; carries artifact refs.
    Completion,
    /// A task failed; carries the error summary.
    Failure,
    /// A task was skipped by the engine.
    Skip,
    /// Liveness signal from an executing worker.
    Heartbeat,
    /// Request that a worker wind down.
    ShutdownRequest,
    /// Worker confirmation that it has stopped.
    ShutdownAck,
    /// Worker refusal to stop; carries the reason.
    ShutdownReject,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationKind::Completion => "completion",
            NotificationKind::Failure => "failure",
            NotificationKind::Skip => "skip",
            NotificationKind::Heartbeat => "heartbeat",
            NotificationKind::ShutdownRequest => "shutdown-request",
            NotificationKind::ShutdownAck => "shutdown-ack",
            NotificationKind::ShutdownReject => "shutdown-reject",
        };
        write!(f, "{}", s)
    }
}

/// An addressable endpoint on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Coordinator,
    Worker(WorkerId),
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Coordinator => write!(f, "coordinator"),
            Recipient::Worker(id) => write!(f, "worker:{}", id.short()),
        }
    }
}

/// A transient event on the bus. Metadata only; bulk payloads travel as
/// artifact references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub sender: Recipient,
    /// Point-to-point destination; `None` marks a broadcast.
    pub recipient: Option<Recipient>,
    /// The task the event concerns, when there is one.
    pub task: Option<TaskId>,
    /// Bounded human-readable summary.
    pub summary: String,
    /// Artifacts referenced by the event.
    pub artifact_refs: Vec<ArtifactKey>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    fn base(kind: NotificationKind, sender: Recipient, recipient: Option<Recipient>) -> Self {
        Self {
            kind,
            sender,
            recipient,
            task: None,
            summary: String::new(),
            artifact_refs: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Task completion notice carrying the produced artifact refs.
    pub fn completion(
        sender: Recipient,
        task: TaskId,
        summary: &str,
        artifact_refs: Vec<ArtifactKey>,
    ) -> Self {
        let mut note = Self::base(
            NotificationKind::Completion,
            sender,
            Some(Recipient::Coordinator),
        );
        note.task = Some(task);
        note.summary = summary.to_string();
        note.artifact_refs = artifact_refs;
        note
    }

    /// Task failure notice with an error summary.
    pub fn failure(sender: Recipient, task: TaskId, reason: &str) -> Self {
        let mut note = Self::base(
            NotificationKind::Failure,
            sender,
            Some(Recipient::Coordinator),
        );
        note.task = Some(task);
        note.summary = reason.to_string();
        note
    }

    /// Skip notice recorded by the engine.
    pub fn skip(sender: Recipient, task: TaskId, reason: &str) -> Self {
        let mut note = Self::base(NotificationKind::Skip, sender, Some(Recipient::Coordinator));
        note.task = Some(task);
        note.summary = reason.to_string();
        note
    }

    /// Worker liveness signal.
    pub fn heartbeat(worker: WorkerId, task: Option<TaskId>) -> Self {
        let mut note = Self::base(
            NotificationKind::Heartbeat,
            Recipient::Worker(worker),
            Some(Recipient::Coordinator),
        );
        note.task = task;
        note
    }

    /// Point-to-point shutdown request for one worker.
    pub fn shutdown_request(worker: WorkerId) -> Self {
        Self::base(
            NotificationKind::ShutdownRequest,
            Recipient::Coordinator,
            Some(Recipient::Worker(worker)),
        )
    }

    /// Team-wide shutdown broadcast (abort).
    pub fn shutdown_broadcast(reason: &str) -> Self {
        let mut note = Self::base(NotificationKind::ShutdownRequest, Recipient::Coordinator, None);
        note.summary = reason.to_string();
        note
    }

    /// Worker acknowledgement of a shutdown request.
    pub fn shutdown_ack(worker: WorkerId) -> Self {
        Self::base(
            NotificationKind::ShutdownAck,
            Recipient::Worker(worker),
            Some(Recipient::Coordinator),
        )
    }

    /// Worker refusal of a shutdown request, with the reason it cannot stop.
    pub fn shutdown_reject(worker: WorkerId, reason: &str) -> Self {
        let mut note = Self::base(
            NotificationKind::ShutdownReject,
            Recipient::Worker(worker),
            Some(Recipient::Coordinator),
        );
        note.summary = reason.to_string();
        note
    }

    /// Check if the notification is a broadcast.
    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }
}

/// The team's notification bus.
///
/// One mpsc inbox per registered recipient; explicit subscriber lists
/// per notification kind for broadcast.
pub struct NotificationBus {
    payload_cap: usize,
    inboxes: Arc<RwLock<HashMap<Recipient, mpsc::Sender<Notification>>>>,
    subscribers: Arc<RwLock<HashMap<NotificationKind, Vec<Recipient>>>>,
}

impl NotificationBus {
    /// Create a bus enforcing the given inline payload cap in bytes.
    pub fn new(payload_cap: usize) -> Self {
        Self {
            payload_cap,
            inboxes: Arc::new(RwLock::new(HashMap::new())),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The configured inline payload cap.
    pub fn payload_cap(&self) -> usize {
        self.payload_cap
    }

    /// Register a recipient, returning its inbox receiver.
    ///
    /// Registering an existing recipient replaces its inbox; the old
    /// receiver stops getting messages.
    pub async fn register(&self, recipient: Recipient) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.inboxes.write().await.insert(recipient, tx);
        rx
    }

    /// Remove a recipient's inbox and its kind subscriptions.
    pub async fn unregister(&self, recipient: &Recipient) {
        self.inboxes.write().await.remove(recipient);
        let mut subscribers = self.subscribers.write().await;
        for list in subscribers.values_mut() {
            list.retain(|r| r != recipient);
        }
    }

    /// Subscribe a recipient to broadcasts of a notification kind.
    pub async fn subscribe(&self, kind: NotificationKind, recipient: Recipient) {
        let mut subscribers = self.subscribers.write().await;
        let list = subscribers.entry(kind).or_default();
        if !list.contains(&recipient) {
            list.push(recipient);
        }
    }

    /// Deliver a notification point-to-point.
    ///
    /// # Errors
    /// - `PayloadTooLarge` if the summary exceeds the cap
    /// - `UnknownRecipient` if the destination is not registered
    pub async fn send(&self, recipient: Recipient, notification: Notification) -> Result<()> {
        self.validate(&notification)?;
        let sender = {
            let inboxes = self.inboxes.read().await;
            inboxes
                .get(&recipient)
                .cloned()
                .ok_or_else(|| Error::UnknownRecipient(recipient.to_string()))?
        };
        // Best-effort: a recipient that has gone away drops the message.
        let _ = sender.send(notification).await;
        Ok(())
    }

    /// Deliver a notification to every subscriber of its kind.
    ///
    /// Subscribers registered after the send do not receive it. Cost is
    /// O(subscribers of the kind), not O(all recipients).
    pub async fn broadcast(&self, notification: Notification) -> Result<usize> {
        self.validate(&notification)?;
        let targets: Vec<mpsc::Sender<Notification>> = {
            let subscribers = self.subscribers.read().await;
            let inboxes = self.inboxes.read().await;
            subscribers
                .get(&notification.kind)
                .map(|list| {
                    list.iter()
                        .filter_map(|recipient| inboxes.get(recipient).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut delivered = 0;
        for target in targets {
            if target.send(notification.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    fn validate(&self, notification: &Notification) -> Result<()> {
        let size = notification.summary.len();
        if size > self.payload_cap {
            return Err(Error::PayloadTooLarge {
                size,
                cap: self.payload_cap,
            });
        }
        Ok(())
    }
}
