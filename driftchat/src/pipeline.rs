//! The message delivery pipeline facade.
//!
//! Wires the send queue, chunker, content codec, status tracker, edit
//! controller, and conversation assembler behind the surface the UI layer
//! consumes: `send`, `load_conversation`, `edit_message`,
//! `queue_snapshot`. The pipeline holds an explicit [`ClientIdentity`]
//! and an injected [`RateLimiter`] — no ambient globals.
//!
//! Send path: validate → rate-limit gate → (offline? enqueue) → chunk →
//! encode → persist rows with an optimistic `sending` status, advanced to
//! `sent` once the insert is durable. Transient storage failures are
//! absorbed into the queue's retry counter and never surface to the
//! caller; validation and authorization failures return synchronously and
//! are never retried.

use std::sync::Arc;

use tokio::sync::mpsc;

use driftchat_proto::chunk::{ChunkPolicy, chunk};
use driftchat_proto::message::{
    ContentType, MessageId, MessageRow, MessageStatus, NewRow, Timestamp, UserId,
    validate_content, validate_participants,
};

use crate::assemble::{ConversationAssembler, DEFAULT_FETCH_LIMIT};
use crate::codec::{CodecError, ContentCodec};
use crate::edit::{EDIT_WINDOW, EditController, EditError};
use crate::limit::{RateLimited, RateLimiter};
use crate::queue::{
    ConnectivityMonitor, DrainOutcome, LocalId, OfflineSendQueue, QueueSender, QueuedSend,
    spawn_connectivity_drain,
};
use crate::status::DeliveryStatusTracker;
use crate::store::{MessageStore, StoreError};

/// The local participant on whose behalf the pipeline operates.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// The signed-in user.
    pub user: UserId,
}

impl ClientIdentity {
    /// Creates an identity for the given user.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: UserId::new(user),
        }
    }
}

/// Tunables resolved at construction time.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// When and how oversized text is split.
    pub chunk_policy: ChunkPolicy,
    /// Delivery attempts per queued entry before it is dropped.
    pub max_send_attempts: u32,
    /// Bound on rows fetched per conversation read.
    pub fetch_limit: usize,
    /// Edit window measured from the stored creation timestamp.
    pub edit_window: std::time::Duration,
    /// Store a sender-addressed copy of every outgoing message (the
    /// dual-copy pattern of the encrypted variant; the read path's dedup
    /// collapses the copies).
    pub store_self_copy: bool,
    /// Buffer size for the pipeline event channel.
    pub event_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_policy: ChunkPolicy::default(),
            max_send_attempts: crate::queue::MAX_SEND_ATTEMPTS,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            edit_window: EDIT_WINDOW,
            store_self_copy: false,
            event_buffer: 64,
        }
    }
}

/// Events emitted for UI notification. Emission is best-effort: a full
/// buffer drops the event, never the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A stored message's delivery status changed.
    StatusChanged {
        /// The message whose status changed.
        id: MessageId,
        /// The new status.
        status: MessageStatus,
    },
    /// A message was queued for later delivery.
    Queued {
        /// The queue-scoped id of the entry.
        local_id: LocalId,
    },
    /// A drain pass finished.
    QueueDrained {
        /// Entries delivered during the pass.
        sent: usize,
        /// Entries dropped after exhausting their retry budget.
        dropped: usize,
    },
    /// A queued entry exhausted its retry budget and was dropped. The
    /// data layer guarantees bounded attempts only; surfacing "failed to
    /// send" is the UI's concern, prompted by this event.
    Dropped {
        /// The queue-scoped id of the dropped entry.
        local_id: LocalId,
        /// Who the message was addressed to.
        receiver: UserId,
    },
}

/// How a send request was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message was persisted; fragments yield one id per row.
    Sent {
        /// Store-minted ids, in fragment order.
        ids: Vec<MessageId>,
    },
    /// The message was queued for delivery when connectivity returns.
    Queued {
        /// The queue-scoped id of the entry.
        local_id: LocalId,
    },
}

/// Errors surfaced synchronously by [`MessagePipeline::send`].
///
/// Transient storage failures never appear here — they are absorbed into
/// the offline queue.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The content or participants failed validation. Not retryable.
    #[error("validation failed: {0}")]
    Validation(#[from] driftchat_proto::message::ValidationError),

    /// The sender is over their rate allowance. Not retryable by the
    /// pipeline.
    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    /// The content transform failed. Not retryable.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Internal failure of the persist step, split so the send path can
/// absorb storage failures while surfacing codec ones.
enum PersistFailure {
    Codec(CodecError),
    Store(StoreError),
}

/// The delivery pipeline.
pub struct MessagePipeline<S> {
    identity: ClientIdentity,
    store: Arc<S>,
    codec: Arc<dyn ContentCodec>,
    limiter: Arc<dyn RateLimiter>,
    connectivity: Arc<ConnectivityMonitor>,
    queue: Arc<OfflineSendQueue>,
    status: DeliveryStatusTracker<S>,
    edits: EditController<S>,
    assembler: ConversationAssembler<S>,
    chunk_policy: ChunkPolicy,
    store_self_copy: bool,
    event_tx: mpsc::Sender<PipelineEvent>,
}

impl<S: MessageStore> MessagePipeline<S> {
    /// Builds a pipeline over the given store, codec, and rate limiter.
    ///
    /// Returns the pipeline, a receiver for [`PipelineEvent`]s the UI
    /// layer should consume, and the connectivity monitor the transport
    /// layer feeds.
    pub fn new(
        identity: ClientIdentity,
        store: Arc<S>,
        codec: Arc<dyn ContentCodec>,
        limiter: Arc<dyn RateLimiter>,
        config: PipelineConfig,
    ) -> (Self, mpsc::Receiver<PipelineEvent>, Arc<ConnectivityMonitor>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let connectivity = Arc::new(ConnectivityMonitor::default());
        let queue = Arc::new(OfflineSendQueue::with_max_attempts(
            &connectivity,
            config.max_send_attempts,
        ));

        let pipeline = Self {
            identity,
            store: Arc::clone(&store),
            codec: Arc::clone(&codec),
            limiter,
            connectivity: Arc::clone(&connectivity),
            queue,
            status: DeliveryStatusTracker::new(Arc::clone(&store)),
            edits: EditController::with_window(
                Arc::clone(&store),
                Arc::clone(&codec),
                config.edit_window,
            ),
            assembler: ConversationAssembler::with_fetch_limit(
                store,
                codec,
                config.fetch_limit,
            ),
            chunk_policy: config.chunk_policy,
            store_self_copy: config.store_self_copy,
            event_tx,
        };
        (pipeline, event_rx, connectivity)
    }

    /// Submits a message for delivery.
    ///
    /// Offline (or when persistence fails transiently) the message is
    /// enqueued and [`SendOutcome::Queued`] is returned; the queue drains
    /// on the next connectivity edge.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] for validation, rate-limit, and codec
    /// failures — all non-retryable and surfaced synchronously.
    pub async fn send(
        &self,
        content: &str,
        content_type: ContentType,
        receiver: &UserId,
    ) -> Result<SendOutcome, SendError> {
        validate_content(content)?;
        validate_participants(&self.identity.user, receiver)?;
        self.limiter.check(&self.identity.user)?;

        if !self.connectivity.is_online() {
            return Ok(self.enqueue(content, content_type, receiver).await);
        }

        match self
            .persist(content, content_type, receiver, Timestamp::now())
            .await
        {
            Ok(ids) => Ok(SendOutcome::Sent { ids }),
            Err(PersistFailure::Codec(err)) => Err(SendError::Codec(err)),
            Err(PersistFailure::Store(err)) => {
                // Absorbed: the queue owns the retry budget from here.
                tracing::warn!(error = %err, "persist failed, queueing for retry");
                Ok(self.enqueue(content, content_type, receiver).await)
            }
        }
    }

    async fn enqueue(
        &self,
        content: &str,
        content_type: ContentType,
        receiver: &UserId,
    ) -> SendOutcome {
        let local_id = self
            .queue
            .enqueue(content.to_owned(), content_type, receiver.clone())
            .await;
        let _ = self.event_tx.try_send(PipelineEvent::Queued { local_id });
        SendOutcome::Queued { local_id }
    }

    /// Chunks, encodes, and persists one logical message, returning the
    /// minted row ids. Rows insert as `sending` and advance to `sent`
    /// once the insert is durable.
    async fn persist(
        &self,
        content: &str,
        content_type: ContentType,
        receiver: &UserId,
        created_at: Timestamp,
    ) -> Result<Vec<MessageId>, PersistFailure> {
        // Images carry a reference, not inline text; only text chunks.
        let fragments = match content_type {
            ContentType::Text => chunk(content, &self.chunk_policy),
            ContentType::Image => chunk(content, &ChunkPolicy::new(usize::MAX, usize::MAX)),
        };

        let mut rows = Vec::with_capacity(fragments.len());
        for fragment in &fragments {
            let stored = self
                .codec
                .encode(&fragment.content)
                .map_err(PersistFailure::Codec)?;
            rows.push(NewRow {
                sender: self.identity.user.clone(),
                receiver: receiver.clone(),
                content: stored,
                content_type,
                created_at,
                status: MessageStatus::Sending,
                chunk_info: fragment.chunk_info,
            });
        }
        if self.store_self_copy && receiver != &self.identity.user {
            // Sender-addressed copies share the origin timestamp so the
            // read path can collapse them with the primary rows.
            let copies: Vec<NewRow> = rows
                .iter()
                .map(|row| NewRow {
                    receiver: self.identity.user.clone(),
                    ..row.clone()
                })
                .collect();
            rows.extend(copies);
        }

        let ids = self
            .store
            .insert_rows(rows)
            .await
            .map_err(PersistFailure::Store)?;

        for id in &ids {
            // Advisory advance; a failure leaves the row at `sending` for
            // a later signal to catch up.
            if let Err(err) = self.store.update_status(id, MessageStatus::Sent).await {
                tracing::warn!(message_id = %id, error = %err, "failed to advance row to sent");
                continue;
            }
            let _ = self.event_tx.try_send(PipelineEvent::StatusChanged {
                id: *id,
                status: MessageStatus::Sent,
            });
        }
        Ok(ids)
    }

    /// Loads the logical message list for a conversation with this
    /// client's configured codec and fetch bound.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying query fails.
    pub async fn load_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Vec<MessageRow>, StoreError> {
        self.assembler.load_conversation(a, b).await
    }

    /// Replaces a message's content on behalf of `requester`.
    ///
    /// # Errors
    ///
    /// Returns [`EditError`] per the edit controller's contract.
    pub async fn edit_message(
        &self,
        id: &MessageId,
        new_content: &str,
        requester: &UserId,
    ) -> Result<(), EditError> {
        self.edits.edit(id, new_content, requester).await
    }

    /// Snapshot of the queued entries for "N messages queued" indicators.
    pub async fn queue_snapshot(&self) -> Vec<QueuedSend> {
        self.queue.snapshot().await
    }

    /// Records a connectivity change; a down→up edge triggers a drain if
    /// the drain task is running.
    pub fn set_online(&self, online: bool) {
        self.connectivity.set_online(online);
    }

    /// Runs one manual drain pass and emits the resulting events.
    pub async fn drain_queue(&self) -> DrainOutcome {
        let outcome = self.queue.drain(self).await;
        if let DrainOutcome::Completed(report) = &outcome {
            for entry in &report.dropped {
                let _ = self.event_tx.try_send(PipelineEvent::Dropped {
                    local_id: entry.local_id,
                    receiver: entry.receiver.clone(),
                });
            }
            let _ = self.event_tx.try_send(PipelineEvent::QueueDrained {
                sent: report.sent.len(),
                dropped: report.dropped.len(),
            });
        }
        outcome
    }

    /// Spawns the edge-triggered drain task for this pipeline.
    pub fn spawn_drain_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        S: 'static,
    {
        spawn_connectivity_drain(
            Arc::clone(&self.queue),
            Arc::clone(self),
            self.connectivity.subscribe(),
        )
    }

    /// The delivery status tracker (receive-side transitions, read
    /// receipts, unread counts).
    pub const fn status(&self) -> &DeliveryStatusTracker<S> {
        &self.status
    }

    /// The local identity this pipeline sends as.
    pub const fn identity(&self) -> &ClientIdentity {
        &self.identity
    }
}

impl<S: MessageStore> QueueSender for MessagePipeline<S> {
    /// One delivery attempt for a queued entry. Storage failures count
    /// against the entry's retry budget; a codec failure is an explicit
    /// refusal (retrying cannot help, but the budget still bounds it).
    async fn send_queued(&self, entry: &QueuedSend) -> Result<bool, StoreError> {
        match self
            .persist(
                &entry.content,
                entry.content_type,
                &entry.receiver,
                entry.created_at,
            )
            .await
        {
            Ok(_ids) => Ok(true),
            Err(PersistFailure::Codec(err)) => {
                tracing::warn!(local_id = %entry.local_id, error = %err, "queued send refused");
                Ok(false)
            }
            Err(PersistFailure::Store(err)) if err.is_transient() => Err(err),
            Err(PersistFailure::Store(err)) => {
                tracing::warn!(
                    local_id = %entry.local_id,
                    error = %err,
                    "non-retryable store failure, counting as refusal"
                );
                Ok(false)
            }
        }
    }
}
