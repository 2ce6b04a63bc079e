//! Durable message storage contract.
//!
//! The store is an external collaborator: an append-only log of
//! [`MessageRow`]s queried by conversation pair and ordered by creation
//! time. The pipeline consumes the contract defined here and never
//! reaches into storage internals. Status updates are last-writer-wins at
//! the store level; the pipeline's monotonicity guards are applied at the
//! application layer before calling in.

pub mod memory;

use driftchat_proto::message::{
    EditRecord, MessageId, MessageRow, MessageStatus, NewRow, Timestamp, UserId,
};

/// Errors surfaced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage backend is unreachable or overloaded. Retryable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write was attempted and failed. Retryable.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Returns `true` for failures worth retrying (these drive the
    /// offline queue's retry counter rather than surfacing to the caller).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::WriteFailed(_))
    }
}

/// Replacement fields applied by an accepted edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpdate {
    /// The sanitized replacement content (post-transform).
    pub content: String,
    /// When the replacement was accepted.
    pub edited_at: Timestamp,
    /// Full superseded-version history, oldest first.
    pub edit_history: Vec<EditRecord>,
}

/// Abstract CRUD contract over the durable message log.
///
/// Implementations must support at-least-once durable insert and return
/// conversation queries in ascending creation order.
pub trait MessageStore: Send + Sync {
    /// Persists a batch of rows atomically enough that fragment groups
    /// are not interleaved with other writers, returning the minted row
    /// ids in input order.
    fn insert_rows(
        &self,
        rows: Vec<NewRow>,
    ) -> impl std::future::Future<Output = Result<Vec<MessageId>, StoreError>> + Send;

    /// Fetches up to `limit` most recent rows exchanged between `a` and
    /// `b`, returned in ascending creation order.
    fn query_conversation(
        &self,
        a: &UserId,
        b: &UserId,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<MessageRow>, StoreError>> + Send;

    /// Reads a single row by id.
    fn get(
        &self,
        id: &MessageId,
    ) -> impl std::future::Future<Output = Result<Option<MessageRow>, StoreError>> + Send;

    /// Sets the status of a row. Last-writer-wins; monotonicity is the
    /// caller's concern.
    fn update_status(
        &self,
        id: &MessageId,
        status: MessageStatus,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Applies an accepted edit's replacement fields to a row.
    fn update_content(
        &self,
        id: &MessageId,
        update: ContentUpdate,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Counts rows addressed to `user` (optionally from one sender only)
    /// whose status is not yet [`MessageStatus::Read`].
    fn count_unread(
        &self,
        user: &UserId,
        from: Option<&UserId>,
    ) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;
}
