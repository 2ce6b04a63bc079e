//! Client-resident queue of not-yet-acknowledged outgoing messages.
//!
//! Messages composed while disconnected (or whose immediate send hit a
//! transient failure) land here and are replayed when connectivity
//! returns. The queue guarantees bounded attempts, FIFO fairness, and a
//! single drain in flight at a time; it owns its entries exclusively and
//! never persists them beyond the session.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use uuid::Uuid;

use driftchat_proto::message::{ContentType, Timestamp, UserId};

use crate::store::StoreError;

/// Delivery attempts per entry before it is dropped.
pub const MAX_SEND_ATTEMPTS: u32 = 3;

/// Locally unique identifier for a queued entry (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Creates a fresh local identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One queued outgoing message, ephemeral to this client session.
#[derive(Debug, Clone)]
pub struct QueuedSend {
    /// Locally unique id (queue-scoped, never a store id).
    pub local_id: LocalId,
    /// Plaintext content as composed; chunking and the content transform
    /// run at send time.
    pub content: String,
    /// Payload kind.
    pub content_type: ContentType,
    /// Addressed participant.
    pub receiver: UserId,
    /// When the entry was enqueued.
    pub created_at: Timestamp,
    /// Failed attempts so far.
    pub retry_count: u32,
}

/// Capability invoked by the queue for each delivery attempt.
///
/// `Ok(true)` means delivered (the entry is removed), `Ok(false)` is an
/// explicit application-level refusal, and `Err` is a transport/storage
/// failure; both of the latter count against the entry's retry budget.
pub trait QueueSender: Send + Sync {
    /// Attempts to deliver one queued entry.
    fn send_queued(
        &self,
        entry: &QueuedSend,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;
}

/// Tracks whether the client currently believes it is connected.
///
/// Wraps a `tokio::sync::watch` channel so drain triggering can be
/// edge-triggered on down→up transitions rather than polled.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Records a connectivity change. Subscribers see each transition.
    pub fn set_online(&self, online: bool) {
        // send_replace never fails even with no subscribers.
        let was = self.tx.send_replace(online);
        if was != online {
            tracing::info!(online, "connectivity changed");
        }
    }

    /// Current connectivity belief.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribes to connectivity transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Result of one completed drain pass.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Entries delivered and removed, in send order.
    pub sent: Vec<LocalId>,
    /// Entries dropped after exhausting their retry budget.
    pub dropped: Vec<QueuedSend>,
    /// Entries that failed but remain queued for a later pass.
    pub retained: usize,
}

/// Outcome of a drain request.
#[derive(Debug)]
pub enum DrainOutcome {
    /// A pass ran to completion.
    Completed(DrainReport),
    /// Skipped: connectivity is down.
    Offline,
    /// Skipped: another drain is already in flight. The caller retries on
    /// the next connectivity edge or manual invocation.
    AlreadyDraining,
    /// Skipped: nothing queued.
    Empty,
}

/// FIFO queue of offline sends with bounded retry.
pub struct OfflineSendQueue {
    entries: Mutex<VecDeque<QueuedSend>>,
    /// Single-flight guard: held for the whole drain pass.
    drain_guard: Mutex<()>,
    online: watch::Receiver<bool>,
    max_attempts: u32,
}

impl OfflineSendQueue {
    /// Creates a queue watching the given connectivity monitor, with the
    /// default retry ceiling.
    #[must_use]
    pub fn new(connectivity: &ConnectivityMonitor) -> Self {
        Self::with_max_attempts(connectivity, MAX_SEND_ATTEMPTS)
    }

    /// Creates a queue with a custom retry ceiling (clamped to at least
    /// one attempt).
    #[must_use]
    pub fn with_max_attempts(connectivity: &ConnectivityMonitor, max_attempts: u32) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            drain_guard: Mutex::new(()),
            online: connectivity.subscribe(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Adds an entry. Always succeeds synchronously from the caller's
    /// point of view and never blocks on I/O.
    pub async fn enqueue(
        &self,
        content: String,
        content_type: ContentType,
        receiver: UserId,
    ) -> LocalId {
        let entry = QueuedSend {
            local_id: LocalId::new(),
            content,
            content_type,
            receiver,
            created_at: Timestamp::now(),
            retry_count: 0,
        };
        let local_id = entry.local_id;
        self.entries.lock().await.push_back(entry);
        tracing::debug!(%local_id, "message enqueued for later delivery");
        local_id
    }

    /// Snapshot of the queued entries, oldest first ("N messages queued"
    /// indicators).
    pub async fn snapshot(&self) -> Vec<QueuedSend> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Number of queued entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Runs one drain pass over the entries queued at the time the pass
    /// starts, in enqueue order.
    ///
    /// Each entry gets one attempt per pass: delivered entries are
    /// removed; a refusal or error increments `retry_count` and drops the
    /// entry once it reaches the ceiling. An entry's attempt always runs
    /// to completion before the next entry is considered — there is no
    /// mid-entry cancellation.
    ///
    /// The pass is skipped (not queued up) when offline, when another
    /// drain is in flight, or when nothing is queued.
    pub async fn drain<Q: QueueSender>(&self, sender: &Q) -> DrainOutcome {
        let Ok(_guard) = self.drain_guard.try_lock() else {
            tracing::debug!("drain already in flight, skipping");
            return DrainOutcome::AlreadyDraining;
        };
        if !*self.online.borrow() {
            return DrainOutcome::Offline;
        }

        // Snapshot of ids fixes this pass's work list; entries enqueued
        // mid-pass wait for the next one.
        let pass: Vec<LocalId> = {
            let entries = self.entries.lock().await;
            entries.iter().map(|e| e.local_id).collect()
        };
        if pass.is_empty() {
            return DrainOutcome::Empty;
        }

        let mut report = DrainReport::default();
        for local_id in pass {
            let Some(entry) = self.get(local_id).await else {
                continue;
            };

            let outcome = sender.send_queued(&entry).await;
            match outcome {
                Ok(true) => {
                    self.remove(local_id).await;
                    report.sent.push(local_id);
                }
                Ok(false) => {
                    tracing::debug!(%local_id, "send refused, counting attempt");
                    self.record_failure(local_id, &mut report).await;
                }
                Err(err) => {
                    tracing::debug!(%local_id, error = %err, "send failed, counting attempt");
                    self.record_failure(local_id, &mut report).await;
                }
            }
        }

        tracing::info!(
            sent = report.sent.len(),
            dropped = report.dropped.len(),
            retained = report.retained,
            "drain pass complete"
        );
        DrainOutcome::Completed(report)
    }

    async fn get(&self, local_id: LocalId) -> Option<QueuedSend> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.local_id == local_id)
            .cloned()
    }

    async fn remove(&self, local_id: LocalId) -> Option<QueuedSend> {
        let mut entries = self.entries.lock().await;
        let pos = entries.iter().position(|e| e.local_id == local_id)?;
        entries.remove(pos)
    }

    /// Increments the entry's retry count in place, dropping it once the
    /// ceiling is reached. Surviving entries keep their queue position.
    async fn record_failure(&self, local_id: LocalId, report: &mut DrainReport) {
        let mut entries = self.entries.lock().await;
        let Some(pos) = entries.iter().position(|e| e.local_id == local_id) else {
            return;
        };
        let entry = &mut entries[pos];
        entry.retry_count += 1;
        if entry.retry_count >= self.max_attempts {
            let dropped = entries
                .remove(pos)
                .unwrap_or_else(|| unreachable!("position checked above"));
            tracing::warn!(
                %local_id,
                attempts = dropped.retry_count,
                "entry exhausted its retry budget and was dropped"
            );
            report.dropped.push(dropped);
        } else {
            report.retained += 1;
        }
    }
}

/// Spawns the edge-triggered drain task: whenever connectivity
/// transitions to up and the queue is non-empty, one drain pass runs.
/// There is no timer while online — draining is edge-triggered, though
/// callers may still invoke [`OfflineSendQueue::drain`] manually.
///
/// The task ends when the connectivity monitor is dropped.
pub fn spawn_connectivity_drain<Q>(
    queue: Arc<OfflineSendQueue>,
    sender: Arc<Q>,
    mut transitions: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()>
where
    Q: QueueSender + 'static,
{
    tokio::spawn(async move {
        while transitions.changed().await.is_ok() {
            let online = *transitions.borrow_and_update();
            if online && !queue.is_empty().await {
                queue.drain(sender.as_ref()).await;
            }
        }
    })
}
