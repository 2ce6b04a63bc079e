//! Property-based tests for the chunking/reassembly protocol.
//!
//! The central law: for any content and any `threshold, chunk_size >= 1`,
//! splitting and then reassembling the complete fragment set reproduces
//! the original content exactly. Plus the defensive laws: partial groups
//! never reconstruct, duplicate fragments are tolerated, and arbitrary
//! chunk metadata never panics the read path.

use proptest::prelude::*;
use uuid::Uuid;

use driftchat_proto::chunk::{ChunkPolicy, chunk, reassemble};
use driftchat_proto::message::{
    ChunkInfo, ContentType, GroupId, MessageId, MessageRow, MessageStatus, NewRow, Timestamp,
    UserId,
};

/// Wraps chunker output in stored rows the way the send path does.
fn rows_from(content: &str, policy: &ChunkPolicy) -> Vec<MessageRow> {
    chunk(content, policy)
        .into_iter()
        .map(|fragment| {
            NewRow {
                sender: UserId::new("alice"),
                receiver: UserId::new("bob"),
                content: fragment.content,
                content_type: ContentType::Text,
                created_at: Timestamp::from_millis(1_000),
                status: MessageStatus::Sent,
                chunk_info: fragment.chunk_info,
            }
            .into_row(MessageId::new())
        })
        .collect()
}

proptest! {
    /// Concatenating fragment contents in index order reproduces the
    /// input exactly, for any policy.
    #[test]
    fn chunk_preserves_content(
        content in "[^\x00]{0,600}",
        threshold in 1usize..200,
        chunk_size in 1usize..200,
    ) {
        let policy = ChunkPolicy::new(threshold, chunk_size);
        let fragments = chunk(&content, &policy);
        let rebuilt: String = fragments.iter().map(|f| f.content.as_str()).collect();
        prop_assert_eq!(rebuilt, content);
    }

    /// Every fragment respects the chunk size, and only oversized content
    /// is fragmented at all.
    #[test]
    fn chunk_respects_policy(
        content in "[a-z]{0,600}",
        threshold in 1usize..200,
        chunk_size in 1usize..200,
    ) {
        let policy = ChunkPolicy::new(threshold, chunk_size);
        let fragments = chunk(&content, &policy);
        let chars = content.chars().count();

        if chars <= threshold {
            prop_assert_eq!(fragments.len(), 1);
            prop_assert!(fragments[0].chunk_info.is_none());
        } else {
            prop_assert!(fragments.len() > 1 || chunk_size >= chars);
            let total = u32::try_from(fragments.len()).unwrap();
            for (i, fragment) in fragments.iter().enumerate() {
                let info = fragment.chunk_info.expect("oversized content must be tagged");
                prop_assert_eq!(info.index, u32::try_from(i).unwrap());
                prop_assert_eq!(info.total_chunks, total);
                prop_assert!(fragment.content.chars().count() <= chunk_size);
            }
        }
    }

    /// Reassembling the complete fragment set yields exactly one logical
    /// message equal to the original.
    #[test]
    fn reassemble_round_trip(
        content in "[^\x00]{1,600}",
        threshold in 1usize..100,
        chunk_size in 1usize..100,
    ) {
        let policy = ChunkPolicy::new(threshold, chunk_size);
        let rows = rows_from(&content, &policy);
        let logical = reassemble(rows);

        prop_assert_eq!(logical.len(), 1);
        prop_assert_eq!(&logical[0].content, &content);
        prop_assert!(logical[0].chunk_info.is_none());
    }

    /// Round-trip holds regardless of the order rows come back from the
    /// store.
    #[test]
    fn reassemble_round_trip_shuffled(
        content in "[a-z]{150,400}",
        seed in any::<u64>(),
    ) {
        let policy = ChunkPolicy::new(100, 60);
        let mut rows = rows_from(&content, &policy);

        // Cheap deterministic shuffle.
        let len = rows.len();
        for i in 0..len {
            let j = usize::try_from(seed.wrapping_mul(31).wrapping_add(i as u64)).unwrap_or(0) % len;
            rows.swap(i, j);
        }

        let logical = reassemble(rows);
        prop_assert_eq!(logical.len(), 1);
        prop_assert_eq!(&logical[0].content, &content);
    }

    /// Removing any one fragment from a multi-fragment group prevents
    /// reconstruction; the survivors surface individually.
    #[test]
    fn partial_group_never_reconstructs(
        content in "[a-z]{150,400}",
        victim in any::<prop::sample::Index>(),
    ) {
        let policy = ChunkPolicy::new(100, 60);
        let mut rows = rows_from(&content, &policy);
        prop_assume!(rows.len() >= 2);

        let victim = victim.index(rows.len());
        rows.remove(victim);
        let survivors = rows.len();

        let logical = reassemble(rows);
        prop_assert_eq!(logical.len(), survivors);
        prop_assert!(logical.iter().all(MessageRow::is_fragment));
        prop_assert!(logical.iter().all(|row| row.content != content));
    }

    /// Duplicate fragments never change the reconstructed content or
    /// produce a second copy of the group.
    #[test]
    fn duplicate_fragments_are_tolerated(
        content in "[a-z]{150,400}",
        dup in any::<prop::sample::Index>(),
    ) {
        let policy = ChunkPolicy::new(100, 60);
        let mut rows = rows_from(&content, &policy);
        let dup = dup.index(rows.len());
        rows.push(rows[dup].clone());

        let logical = reassemble(rows);
        prop_assert_eq!(logical.len(), 1);
        prop_assert_eq!(&logical[0].content, &content);
    }

    /// Arbitrary (possibly malformed) chunk metadata never panics the
    /// read path, and no input rows are silently invented.
    #[test]
    fn reassemble_never_panics_on_arbitrary_metadata(
        rows in prop::collection::vec(
            (
                "[a-z]{0,40}",
                any::<u128>(),
                any::<u32>(),
                any::<u32>(),
                any::<bool>(),
            ),
            0..12,
        )
    ) {
        let rows: Vec<MessageRow> = rows
            .into_iter()
            .map(|(content, group, index, total, tagged)| {
                NewRow {
                    sender: UserId::new("alice"),
                    receiver: UserId::new("bob"),
                    content,
                    content_type: ContentType::Text,
                    created_at: Timestamp::from_millis(1),
                    status: MessageStatus::Sent,
                    chunk_info: tagged.then_some(ChunkInfo {
                        group_id: GroupId::from_uuid(Uuid::from_u128(group)),
                        index,
                        total_chunks: total,
                    }),
                }
                .into_row(MessageId::new())
            })
            .collect();

        let input_len = rows.len();
        let logical = reassemble(rows);
        prop_assert!(logical.len() <= input_len);
    }
}
