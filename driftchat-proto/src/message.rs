//! Stored-row and wire types for the Driftchat delivery pipeline.
//!
//! A [`MessageRow`] is the unit the store persists: usually one row per
//! logical message, but oversized text payloads are persisted as several
//! fragment rows tagged with [`ChunkInfo`] and merged back on read. All
//! types serialize with serde and travel over the wire via postcard.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard cap on message content length in characters (64 K).
///
/// Content over the chunking threshold is split into fragments; content
/// over this cap is rejected outright.
pub const MAX_CONTENT_CHARS: usize = 64 * 1024;

/// Unique identifier for a stored message row, based on UUID v7 for
/// time-ordering. Minted by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `MessageId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier shared by every fragment of one oversized logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Creates a fresh group identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `GroupId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a conversation participant.
///
/// Opaque to the pipeline: issued by the (external) session layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier from its string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this user ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is empty (never valid as a
    /// participant).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order-independent pairing key for a two-party conversation.
///
/// `ConversationKey::new(a, b)` and `ConversationKey::new(b, a)` compare
/// equal, so either participant can address the same thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    first: UserId,
    second: UserId,
}

impl ConversationKey {
    /// Builds the pairing key for two participants, normalizing order.
    #[must_use]
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self {
                first: a,
                second: b,
            }
        } else {
            Self {
                first: b,
                second: a,
            }
        }
    }

    /// Returns `true` if `user` is one of the two participants.
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        &self.first == user || &self.second == user
    }

    /// Returns `true` if the given sender/receiver pair belongs to this
    /// conversation.
    #[must_use]
    pub fn matches(&self, sender: &UserId, receiver: &UserId) -> bool {
        self.contains(sender) && self.contains(receiver)
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.first, self.second)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed from `earlier` to `self`, saturating at zero
    /// when `earlier` is in the future (clock skew).
    #[must_use]
    pub const fn millis_since(&self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Kind of payload a message row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain text content.
    Text,
    /// An image reference (URL or store handle).
    Image,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Delivery lifecycle of a logical message.
///
/// Transitions are one-directional: `Sending -> {Sent, Failed}`,
/// `Sent -> Delivered -> Read`. Any non-`Read` state may jump straight to
/// `Read` (batch mark-as-read short-circuits the intermediate states).
/// `Failed` is terminal for the attempt — a resend mints a new row rather
/// than mutating the failed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Optimistically rendered locally, not yet durably persisted.
    Sending,
    /// Persisted/transmitted, awaiting delivery confirmation.
    Sent,
    /// Delivery confirmed by the receiving side.
    Delivered,
    /// Read receipt recorded by the receiver.
    Read,
    /// The delivery attempt failed.
    Failed,
}

impl MessageStatus {
    /// Returns `true` if the state machine permits moving from `self` to
    /// `next`.
    ///
    /// Re-applying the current status is permitted (callers treat it as an
    /// idempotent no-op). Regressions are never permitted.
    #[must_use]
    pub fn may_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            // Short-circuit: anything still in flight can be marked read.
            (Self::Sending | Self::Sent | Self::Delivered, Self::Read)
                | (Self::Sending, Self::Sent | Self::Failed)
                | (Self::Sent, Self::Delivered)
        )
    }

    /// Returns `true` once no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Position of a fragment row within its oversized parent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Identifier shared by every fragment of the parent message.
    pub group_id: GroupId,
    /// Zero-based position of this fragment.
    pub index: u32,
    /// Fragment count fixed at creation time for the whole group.
    pub total_chunks: u32,
}

impl ChunkInfo {
    /// Returns `true` if the metadata is internally consistent.
    ///
    /// A zero `total_chunks` or an out-of-range index marks the group as
    /// malformed; the read path surfaces such rows unmodified instead of
    /// attempting reconstruction.
    #[must_use]
    pub const fn is_wellformed(&self) -> bool {
        self.total_chunks >= 1 && self.index < self.total_chunks
    }
}

/// One superseded content version retained by the edit mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRecord {
    /// The content that was replaced.
    pub prior_content: String,
    /// When the replaced content itself had last been set.
    pub edited_at: Timestamp,
}

/// A stored message row.
///
/// Ordinary rows (`chunk_info: None`) are complete logical messages.
/// Fragment rows must be reduced through [`crate::chunk::reassemble`]
/// before being shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    /// Store-minted identity.
    pub id: MessageId,
    /// Originating participant.
    pub sender: UserId,
    /// Addressed participant.
    pub receiver: UserId,
    /// Payload — pre-transform in memory, post-transform at rest.
    pub content: String,
    /// Payload kind.
    pub content_type: ContentType,
    /// Origin timestamp, assigned once at creation, never mutated.
    pub created_at: Timestamp,
    /// Current delivery lifecycle state.
    pub status: MessageStatus,
    /// Whether at least one edit has been accepted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_edited: bool,
    /// When the current content was set, if edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
    /// Superseded content versions, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edit_history: Vec<EditRecord>,
    /// Present only on fragments of an oversized logical message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
}

impl MessageRow {
    /// Returns `true` if this row is a fragment of a chunk group.
    #[must_use]
    pub const fn is_fragment(&self) -> bool {
        self.chunk_info.is_some()
    }

    /// Returns the order-independent pairing key of this row's
    /// conversation.
    #[must_use]
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(self.sender.clone(), self.receiver.clone())
    }
}

/// A row prepared by the pipeline but not yet persisted.
///
/// The store assigns the [`MessageId`] on insert; everything else is fixed
/// by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRow {
    /// Originating participant.
    pub sender: UserId,
    /// Addressed participant.
    pub receiver: UserId,
    /// Payload, already passed through the content transform.
    pub content: String,
    /// Payload kind.
    pub content_type: ContentType,
    /// Origin timestamp.
    pub created_at: Timestamp,
    /// Initial lifecycle state (normally [`MessageStatus::Sending`]).
    pub status: MessageStatus,
    /// Present only on fragments.
    pub chunk_info: Option<ChunkInfo>,
}

impl NewRow {
    /// Completes this row into a [`MessageRow`] with a store-minted id.
    #[must_use]
    pub fn into_row(self, id: MessageId) -> MessageRow {
        MessageRow {
            id,
            sender: self.sender,
            receiver: self.receiver,
            content: self.content,
            content_type: self.content_type,
            created_at: self.created_at,
            status: self.status,
            is_edited: false,
            edited_at: None,
            edit_history: Vec::new(),
            chunk_info: self.chunk_info,
        }
    }
}

/// Error returned when outgoing content fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Content is empty or whitespace-only.
    #[error("message content is empty")]
    Empty,
    /// Content exceeds the hard cap even before chunking.
    #[error("message too large ({chars} characters, max {max})")]
    TooLarge {
        /// Actual content length in characters.
        chars: usize,
        /// Maximum allowed length in characters.
        max: usize,
    },
    /// A participant identifier is empty.
    #[error("invalid participant: {0}")]
    InvalidParticipant(String),
}

/// Validates outgoing content against the hard cap.
///
/// Chunking handles oversized-but-capped payloads; this check rejects only
/// empty/whitespace content and content beyond [`MAX_CONTENT_CHARS`].
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] or [`ValidationError::TooLarge`].
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let chars = content.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(ValidationError::TooLarge {
            chars,
            max: MAX_CONTENT_CHARS,
        });
    }
    Ok(())
}

/// Validates a sender/receiver pair.
///
/// Self-addressed rows are legal (the encrypted variant stores a sender
/// self-copy); only empty identifiers are rejected.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidParticipant`] naming the offending
/// side.
pub fn validate_participants(sender: &UserId, receiver: &UserId) -> Result<(), ValidationError> {
    if sender.is_empty() {
        return Err(ValidationError::InvalidParticipant("sender".into()));
    }
    if receiver.is_empty() {
        return Err(ValidationError::InvalidParticipant("receiver".into()));
    }
    Ok(())
}

/// A read receipt, unique per `(message, reader)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// The message that was read.
    pub message_id: MessageId,
    /// Who read it.
    pub reader: UserId,
    /// When the receipt was recorded.
    pub read_at: Timestamp,
}

/// Cue from the realtime layer: new data may be available for a
/// conversation.
///
/// Consumers treat this purely as a prompt to re-query the store — never
/// as a source of authoritative content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCue {
    /// The conversation that may have new rows.
    pub conversation: ConversationKey,
}

/// Top-level envelope wrapping all wire-level protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireEnvelope {
    /// A stored message row pushed or pulled between client and store
    /// front-end.
    Message(MessageRow),
    /// A read receipt notification.
    Receipt(ReadReceipt),
    /// A "data may be available" cue from the realtime layer.
    Sync(SyncCue),
}
