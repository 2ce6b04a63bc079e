//! Property-based serialization round-trip tests.
//!
//! Uses proptest to verify:
//! 1. Any valid `MessageRow` survives encode → decode round-trip.
//! 2. Any valid `WireEnvelope` survives encode → decode round-trip.
//! 3. Random bytes never cause a panic in `decode` (returns `Err`
//!    gracefully).
//! 4. Framed encode → decode round-trips correctly for any valid
//!    envelope.

use proptest::prelude::*;
use uuid::Uuid;

use driftchat_proto::codec;
use driftchat_proto::message::*;

// --- Arbitrary implementations for protocol types ---

/// Strategy for generating arbitrary `MessageId` values.
fn arb_message_id() -> impl Strategy<Value = MessageId> {
    any::<u128>().prop_map(|n| MessageId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `GroupId` values.
fn arb_group_id() -> impl Strategy<Value = GroupId> {
    any::<u128>().prop_map(|n| GroupId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `UserId` values.
fn arb_user_id() -> impl Strategy<Value = UserId> {
    "[a-z0-9_-]{1,24}".prop_map(UserId::new)
}

/// Strategy for generating arbitrary `Timestamp` values.
fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    any::<u64>().prop_map(Timestamp::from_millis)
}

/// Strategy for generating arbitrary `ContentType` values.
fn arb_content_type() -> impl Strategy<Value = ContentType> {
    prop_oneof![Just(ContentType::Text), Just(ContentType::Image)]
}

/// Strategy for generating arbitrary `MessageStatus` values.
fn arb_status() -> impl Strategy<Value = MessageStatus> {
    prop_oneof![
        Just(MessageStatus::Sending),
        Just(MessageStatus::Sent),
        Just(MessageStatus::Delivered),
        Just(MessageStatus::Read),
        Just(MessageStatus::Failed),
    ]
}

/// Strategy for generating optional chunk metadata.
fn arb_chunk_info() -> impl Strategy<Value = Option<ChunkInfo>> {
    prop_oneof![
        Just(None),
        (arb_group_id(), 0u32..16, 1u32..16).prop_map(|(group_id, index, total_chunks)| {
            Some(ChunkInfo {
                group_id,
                index,
                total_chunks,
            })
        }),
    ]
}

/// Strategy for generating edit history entries.
fn arb_edit_history() -> impl Strategy<Value = Vec<EditRecord>> {
    prop::collection::vec(
        ("[^\x00]{1,64}", arb_timestamp()).prop_map(|(prior_content, edited_at)| EditRecord {
            prior_content,
            edited_at,
        }),
        0..4,
    )
}

/// Strategy for generating arbitrary `MessageRow` values.
fn arb_message_row() -> impl Strategy<Value = MessageRow> {
    (
        arb_message_id(),
        arb_user_id(),
        arb_user_id(),
        "[^\x00]{1,512}",
        arb_content_type(),
        arb_timestamp(),
        arb_status(),
        arb_edit_history(),
        arb_chunk_info(),
    )
        .prop_map(
            |(id, sender, receiver, content, content_type, created_at, status, history, info)| {
                let is_edited = !history.is_empty();
                MessageRow {
                    id,
                    sender,
                    receiver,
                    content,
                    content_type,
                    created_at,
                    status,
                    is_edited,
                    edited_at: is_edited.then_some(created_at),
                    edit_history: history,
                    chunk_info: info,
                }
            },
        )
}

/// Strategy for generating arbitrary `WireEnvelope` values.
fn arb_envelope() -> impl Strategy<Value = WireEnvelope> {
    prop_oneof![
        arb_message_row().prop_map(WireEnvelope::Message),
        (arb_message_id(), arb_user_id(), arb_timestamp()).prop_map(
            |(message_id, reader, read_at)| {
                WireEnvelope::Receipt(ReadReceipt {
                    message_id,
                    reader,
                    read_at,
                })
            }
        ),
        (arb_user_id(), arb_user_id()).prop_map(|(a, b)| {
            WireEnvelope::Sync(SyncCue {
                conversation: ConversationKey::new(a, b),
            })
        }),
    ]
}

// --- Property tests ---

proptest! {
    /// Any valid MessageRow survives an encode → decode round-trip.
    #[test]
    fn message_row_round_trip(row in arb_message_row()) {
        let envelope = WireEnvelope::Message(row);
        let bytes = codec::encode(&envelope).expect("encode should succeed");
        let decoded = codec::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(envelope, decoded);
    }

    /// Any valid WireEnvelope variant survives an encode → decode round-trip.
    #[test]
    fn envelope_round_trip(envelope in arb_envelope()) {
        let bytes = codec::encode(&envelope).expect("encode should succeed");
        let decoded = codec::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(envelope, decoded);
    }

    /// Any valid WireEnvelope survives a framed encode → decode round-trip.
    #[test]
    fn framed_envelope_round_trip(envelope in arb_envelope()) {
        let frame = codec::encode_framed(&envelope).expect("encode_framed should succeed");
        let (decoded, consumed) =
            codec::decode_framed(&frame).expect("decode_framed should succeed");
        prop_assert_eq!(&envelope, &decoded);
        prop_assert_eq!(consumed, frame.len());
    }

    /// Random bytes never cause a panic when decoded — they return Err
    /// gracefully.
    #[test]
    fn random_bytes_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode(&bytes);
    }

    /// Random bytes never cause a panic when decoded as a framed message.
    #[test]
    fn random_bytes_decode_framed_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_framed(&bytes);
    }

    /// The JSON surface always carries the mandatory fields.
    #[test]
    fn row_json_carries_mandatory_fields(row in arb_message_row()) {
        let json = serde_json::to_value(&row).expect("serialize should succeed");
        for field in ["id", "sender", "receiver", "content", "content_type", "created_at", "status"] {
            prop_assert!(json.get(field).is_some(), "missing field {}", field);
        }
    }
}
