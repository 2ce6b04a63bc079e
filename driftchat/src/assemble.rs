//! Read path: merging stored rows into the externally visible ordered
//! message list.
//!
//! Fetches a conversation's rows in ascending creation order, reduces
//! chunk groups through the reassembler, reverses the content transform,
//! and collapses duplicate rows that represent the same logical event
//! stored twice. That duplication arises when a self-addressed copy is
//! stored so the sender can decrypt their own message: the two copies are
//! ciphertext-distinct at rest and only reveal as duplicates after
//! decoding, so dedup must run post-decode.

use std::collections::HashSet;
use std::sync::Arc;

use driftchat_proto::chunk::reassemble;
use driftchat_proto::message::{ContentType, MessageRow, Timestamp, UserId};

use crate::codec::ContentCodec;
use crate::store::{MessageStore, StoreError};

/// Default bound on rows fetched per conversation read.
pub const DEFAULT_FETCH_LIMIT: usize = 200;

/// Identity key under which two stored rows count as the same logical
/// event.
///
/// This is a heuristic inherited from the deployed system: two genuinely
/// distinct messages with identical content sent by the same sender in
/// the same millisecond would collapse. A shared correlation id would be
/// the watertight scheme.
type DedupKey = (UserId, String, Timestamp, ContentType);

/// Assembles logical conversations from raw stored rows.
pub struct ConversationAssembler<S> {
    store: Arc<S>,
    codec: Arc<dyn ContentCodec>,
    fetch_limit: usize,
}

impl<S: MessageStore> ConversationAssembler<S> {
    /// Creates an assembler with the default fetch bound.
    pub fn new(store: Arc<S>, codec: Arc<dyn ContentCodec>) -> Self {
        Self::with_fetch_limit(store, codec, DEFAULT_FETCH_LIMIT)
    }

    /// Creates an assembler bounding each read to the most recent
    /// `fetch_limit` rows.
    pub fn with_fetch_limit(
        store: Arc<S>,
        codec: Arc<dyn ContentCodec>,
        fetch_limit: usize,
    ) -> Self {
        Self {
            store,
            codec,
            fetch_limit,
        }
    }

    /// Loads the logical message list for a conversation pair, ascending
    /// by creation time.
    ///
    /// Chunk groups are merged (partial groups surface as raw fragments),
    /// content is decoded, and post-decode duplicates collapse to their
    /// first occurrence. Status and edit fields ride along on each row.
    /// Read-path anomalies — malformed chunk metadata, undecodable
    /// content — degrade to the stored form with a warning rather than
    /// failing the whole read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the underlying query fails.
    pub async fn load_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Vec<MessageRow>, StoreError> {
        let rows = self
            .store
            .query_conversation(a, b, self.fetch_limit)
            .await?;
        let logical = reassemble(rows);

        let mut seen: HashSet<DedupKey> = HashSet::new();
        let mut result = Vec::with_capacity(logical.len());

        for mut row in logical {
            self.decode_in_place(&mut row);

            let key = (
                row.sender.clone(),
                row.content.clone(),
                row.created_at,
                row.content_type,
            );
            // First occurrence wins; self-copy duplicates drop silently.
            if seen.insert(key) {
                result.push(row);
            } else {
                tracing::debug!(
                    message_id = %row.id,
                    "dropping duplicate copy of an already-seen logical event"
                );
            }
        }
        Ok(result)
    }

    /// Reverses the content transform on a row, including its retained
    /// edit history. An undecodable payload keeps its stored form.
    fn decode_in_place(&self, row: &mut MessageRow) {
        match self.codec.decode(&row.content) {
            Ok(plain) => row.content = plain,
            Err(err) => {
                tracing::warn!(
                    message_id = %row.id,
                    error = %err,
                    "content decode failed, surfacing stored form"
                );
            }
        }
        for record in &mut row.edit_history {
            if let Ok(plain) = self.codec.decode(&record.prior_content) {
                record.prior_content = plain;
            }
        }
    }
}
