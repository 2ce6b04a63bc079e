//! In-memory implementation of [`MessageStore`].
//!
//! Backs tests and the demo binary. Rows live in insertion order behind a
//! `tokio::sync::Mutex`; nothing survives the process.

use tokio::sync::Mutex;

use driftchat_proto::message::{
    ConversationKey, MessageId, MessageRow, MessageStatus, NewRow, UserId,
};

use super::{ContentUpdate, MessageStore, StoreError};

/// In-memory message log.
#[derive(Default)]
pub struct InMemoryStore {
    /// Rows in insertion order (stable within equal timestamps).
    rows: Mutex<Vec<MessageRow>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored (tests and indicators).
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    /// Returns `true` if the store holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }
}

impl MessageStore for InMemoryStore {
    async fn insert_rows(&self, rows: Vec<NewRow>) -> Result<Vec<MessageId>, StoreError> {
        let mut stored = self.rows.lock().await;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id = MessageId::new();
            stored.push(row.into_row(id));
            ids.push(id);
        }
        Ok(ids)
    }

    async fn query_conversation(
        &self,
        a: &UserId,
        b: &UserId,
        limit: usize,
    ) -> Result<Vec<MessageRow>, StoreError> {
        let key = ConversationKey::new(a.clone(), b.clone());
        let rows = self.rows.lock().await;
        let mut matching: Vec<MessageRow> = rows
            .iter()
            .filter(|row| key.matches(&row.sender, &row.receiver))
            .cloned()
            .collect();

        // Ascending by creation time; the stable sort preserves insertion
        // order (and therefore fragment index order) within a timestamp.
        matching.sort_by_key(|row| row.created_at);
        if matching.len() > limit {
            matching.drain(..matching.len() - limit);
        }
        Ok(matching)
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRow>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|row| row.id == *id).cloned())
    }

    async fn update_status(&self, id: &MessageId, status: MessageStatus) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        match rows.iter_mut().find(|row| row.id == *id) {
            Some(row) => {
                row.status = status;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("message {id}"))),
        }
    }

    async fn update_content(&self, id: &MessageId, update: ContentUpdate) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        match rows.iter_mut().find(|row| row.id == *id) {
            Some(row) => {
                row.content = update.content;
                row.is_edited = true;
                row.edited_at = Some(update.edited_at);
                row.edit_history = update.edit_history;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("message {id}"))),
        }
    }

    async fn count_unread(
        &self,
        user: &UserId,
        from: Option<&UserId>,
    ) -> Result<usize, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|row| row.receiver == *user)
            .filter(|row| from.is_none_or(|sender| row.sender == *sender))
            .filter(|row| row.status != MessageStatus::Read)
            .count())
    }
}
