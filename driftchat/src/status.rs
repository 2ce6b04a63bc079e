//! Delivery status tracking for stored messages.
//!
//! Maintains the per-message lifecycle state machine
//! (`sending -> sent -> delivered -> read`, with `failed` as the terminal
//! branch of a send attempt) on top of a last-writer-wins store. The
//! guards here are advisory, applied at the application layer: a stale or
//! duplicate signal is absorbed as a no-op rather than an error, and a
//! more-advanced status is never regressed. `failed` rows are excluded
//! from the read short-circuit — a resend mints a new row instead.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use driftchat_proto::message::{MessageId, MessageStatus, Timestamp, UserId};

use crate::store::{MessageStore, StoreError};

/// Errors surfaced by status operations.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// The message id does not resolve to a stored row.
    #[error("message {0} not found")]
    NotFound(MessageId),

    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// A recorded read receipt, unique per `(message, reader)` pair.
type ReceiptKey = (MessageId, UserId);

/// Tracks delivery status transitions and read receipts.
pub struct DeliveryStatusTracker<S> {
    store: Arc<S>,
    /// Receipts already recorded this session; a second read by the same
    /// reader is a no-op, not an error.
    receipts: Mutex<HashSet<ReceiptKey>>,
}

impl<S: MessageStore> DeliveryStatusTracker<S> {
    /// Creates a tracker over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            receipts: Mutex::new(HashSet::new()),
        }
    }

    /// Applies a single-row status transition.
    ///
    /// Idempotent: re-applying the current status succeeds without a
    /// write. A signal that would regress the row (e.g. a late
    /// `delivered` arriving after `read`) is absorbed as a no-op. Returns
    /// the row's resulting status.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::NotFound`] if the id does not resolve, or
    /// [`StatusError::Store`] on storage failure.
    pub async fn mark_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
    ) -> Result<MessageStatus, StatusError> {
        let row = self
            .store
            .get(id)
            .await?
            .ok_or(StatusError::NotFound(*id))?;

        if row.status == status {
            return Ok(row.status);
        }
        if !row.status.may_transition_to(status) {
            tracing::debug!(
                message_id = %id,
                current = %row.status,
                requested = %status,
                "ignoring status signal that would regress the row"
            );
            return Ok(row.status);
        }

        self.store.update_status(id, status).await?;
        Ok(status)
    }

    /// Marks every currently-`sent` row in `ids` as delivered.
    ///
    /// Rows already `delivered` or `read` are left untouched (the
    /// monotonicity guard), as are rows still `sending` or `failed`.
    /// Unknown ids are skipped. Returns the ids actually transitioned.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Store`] on storage failure; rows already
    /// processed stay transitioned.
    pub async fn batch_mark_delivered(
        &self,
        ids: &[MessageId],
    ) -> Result<Vec<MessageId>, StatusError> {
        let mut transitioned = Vec::new();
        for id in ids {
            let Some(row) = self.store.get(id).await? else {
                continue;
            };
            if row.status == MessageStatus::Sent {
                self.store.update_status(id, MessageStatus::Delivered).await?;
                transitioned.push(*id);
            }
        }
        Ok(transitioned)
    }

    /// Records a read receipt for `(message_id, reader)` and advances the
    /// row to `read`, short-circuiting intermediate states.
    ///
    /// Idempotent per pair: returns `true` when the receipt was newly
    /// recorded, `false` when this reader had already read the message.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::NotFound`] if the id does not resolve, or
    /// [`StatusError::Store`] on storage failure.
    pub async fn mark_read(
        &self,
        message_id: &MessageId,
        reader: &UserId,
    ) -> Result<bool, StatusError> {
        {
            let receipts = self.receipts.lock().await;
            if receipts.contains(&(*message_id, reader.clone())) {
                return Ok(false);
            }
        }

        let row = self
            .store
            .get(message_id)
            .await?
            .ok_or(StatusError::NotFound(*message_id))?;

        if row.status.may_transition_to(MessageStatus::Read)
            && row.status != MessageStatus::Read
        {
            self.store
                .update_status(message_id, MessageStatus::Read)
                .await?;
        }

        let newly_recorded = self
            .receipts
            .lock()
            .await
            .insert((*message_id, reader.clone()));
        if newly_recorded {
            tracing::debug!(
                message_id = %message_id,
                reader = %reader,
                at = %Timestamp::now(),
                "read receipt recorded"
            );
        }
        Ok(newly_recorded)
    }

    /// Counts rows addressed to `user` (optionally from one sender only)
    /// that have not been read.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Store`] on storage failure.
    pub async fn unread_count(
        &self,
        user: &UserId,
        from: Option<&UserId>,
    ) -> Result<usize, StatusError> {
        Ok(self.store.count_unread(user, from).await?)
    }
}
