//! Time-boxed message editing with history retention.
//!
//! A sender may replace a message's content within a fixed window of its
//! creation. The predicate is pure so the client and the persisting
//! authority derive the same answer, and the controller re-validates
//! against the *stored* creation timestamp — a stale or forged client
//! timestamp cannot extend the window. Superseded versions are retained
//! oldest-first; the current content is never duplicated into history.

use std::sync::Arc;
use std::time::Duration;

use driftchat_proto::message::{EditRecord, MessageId, Timestamp, UserId};

use crate::codec::{CodecError, ContentCodec};
use crate::store::{ContentUpdate, MessageStore, StoreError};

/// Default edit window: five minutes from creation, inclusive.
pub const EDIT_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Errors surfaced by edit operations.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// The edit window has expired for this message.
    #[error("edit window expired")]
    WindowExpired,

    /// The requester is not the message sender.
    #[error("only the sender may edit a message")]
    NotAuthorized,

    /// The replacement content is empty or whitespace-only (possibly
    /// after sanitization).
    #[error("replacement content is empty")]
    EmptyContent,

    /// The message id does not resolve to a stored row.
    #[error("message {0} not found")]
    NotFound(MessageId),

    /// The content transform failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Pure edit-permission predicate.
///
/// True iff `requester` is the sender and no more than `window` has
/// elapsed from `created_at` to `now`. The boundary is inclusive: an edit
/// at exactly `window` after creation is still permitted.
#[must_use]
pub fn can_edit(
    created_at: Timestamp,
    sender: &UserId,
    requester: &UserId,
    now: Timestamp,
    window: Duration,
) -> bool {
    if requester != sender {
        return false;
    }
    let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    now.millis_since(created_at) <= window_ms
}

/// Case-insensitive byte search for an ASCII needle.
///
/// ASCII bytes only ever match ASCII bytes in UTF-8, so any hit sits on a
/// char boundary of the haystack.
fn find_ascii_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if from + needle.len() > hay.len() {
        return None;
    }
    (from..=hay.len() - needle.len())
        .find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Strips script-injection vectors from replacement content.
///
/// Removes `<script ...>...</script>` blocks (an unterminated block is
/// stripped to the end) and any orphaned opening or closing script tags,
/// case-insensitively. Everything else passes through untouched.
#[must_use]
pub fn sanitize_content(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;

    while let Some(open) = find_ascii_ci(content, "<script", cursor) {
        out.push_str(&content[cursor..open]);
        match find_ascii_ci(content, "</script", open) {
            Some(close) => {
                // Skip past the closing tag's '>'.
                cursor = find_ascii_ci(content, ">", close)
                    .map_or(content.len(), |gt| gt + 1);
            }
            None => {
                cursor = content.len();
            }
        }
    }
    out.push_str(&content[cursor..]);

    // Orphaned closing tags carry no opening counterpart; drop them too.
    let mut cleaned = String::with_capacity(out.len());
    let mut cursor = 0;
    while let Some(close) = find_ascii_ci(&out, "</script", cursor) {
        cleaned.push_str(&out[cursor..close]);
        cursor = find_ascii_ci(&out, ">", close).map_or(out.len(), |gt| gt + 1);
    }
    cleaned.push_str(&out[cursor..]);
    cleaned
}

/// Enforces the edit window and maintains edit history.
pub struct EditController<S> {
    store: Arc<S>,
    codec: Arc<dyn ContentCodec>,
    window: Duration,
}

impl<S: MessageStore> EditController<S> {
    /// Creates a controller with the default five-minute window.
    pub fn new(store: Arc<S>, codec: Arc<dyn ContentCodec>) -> Self {
        Self::with_window(store, codec, EDIT_WINDOW)
    }

    /// Creates a controller with a custom window.
    pub fn with_window(store: Arc<S>, codec: Arc<dyn ContentCodec>, window: Duration) -> Self {
        Self {
            store,
            codec,
            window,
        }
    }

    /// Replaces a message's content, retaining the superseded version.
    ///
    /// Re-validates [`can_edit`] against the stored `created_at`,
    /// sanitizes the replacement, appends the prior content to
    /// `edit_history` (stamped with the time it had been set), and
    /// persists the update.
    ///
    /// # Errors
    ///
    /// [`EditError::NotFound`] if the id does not resolve,
    /// [`EditError::NotAuthorized`] on sender mismatch,
    /// [`EditError::WindowExpired`] past the window,
    /// [`EditError::EmptyContent`] if the replacement is empty or
    /// whitespace-only after sanitization, plus codec/store pass-through.
    pub async fn edit(
        &self,
        id: &MessageId,
        new_content: &str,
        requester: &UserId,
    ) -> Result<(), EditError> {
        let row = self
            .store
            .get(id)
            .await?
            .ok_or(EditError::NotFound(*id))?;

        if requester != &row.sender {
            return Err(EditError::NotAuthorized);
        }
        // The stored created_at is authoritative here, never a
        // client-supplied timestamp.
        let now = Timestamp::now();
        if !can_edit(row.created_at, &row.sender, requester, now, self.window) {
            return Err(EditError::WindowExpired);
        }

        if new_content.trim().is_empty() {
            return Err(EditError::EmptyContent);
        }
        let sanitized = sanitize_content(new_content);
        if sanitized.trim().is_empty() {
            return Err(EditError::EmptyContent);
        }

        let mut history = row.edit_history.clone();
        history.push(EditRecord {
            prior_content: row.content.clone(),
            edited_at: row.edited_at.unwrap_or(row.created_at),
        });

        let stored = self.codec.encode(&sanitized)?;
        self.store
            .update_content(
                id,
                ContentUpdate {
                    content: stored,
                    edited_at: now,
                    edit_history: history,
                },
            )
            .await?;

        tracing::debug!(message_id = %id, "edit accepted");
        Ok(())
    }
}
