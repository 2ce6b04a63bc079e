//! Splitting oversized text payloads into fragment rows and merging them
//! back into logical messages.
//!
//! Chunking is deterministic and purely positional: fragments are
//! contiguous, non-overlapping slices of the original content in original
//! order, and concatenating fragment contents in index order reproduces
//! the input exactly. Splitting happens at `char` boundaries so multi-byte
//! text is never corrupted.
//!
//! Reassembly is defensive: a group missing fragments (crash mid-insert)
//! or carrying malformed metadata is surfaced as raw rows rather than
//! failing the read, so no data silently disappears.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::message::{ChunkInfo, GroupId, MessageRow};

/// Character thresholds governing when and how content is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    /// Content at or under this many characters stays a single row.
    pub threshold: usize,
    /// Maximum characters per fragment once splitting kicks in.
    pub chunk_size: usize,
}

impl ChunkPolicy {
    /// Builds a policy, clamping both limits to at least one character.
    #[must_use]
    pub const fn new(threshold: usize, chunk_size: usize) -> Self {
        Self {
            threshold: if threshold == 0 { 1 } else { threshold },
            chunk_size: if chunk_size == 0 { 1 } else { chunk_size },
        }
    }
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            threshold: 1000,
            chunk_size: 800,
        }
    }
}

/// One outgoing slice produced by [`chunk`].
///
/// `chunk_info` is `None` exactly when the content fit under the policy
/// threshold and the piece is an ordinary (non-fragment) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// The slice of the original content this piece carries.
    pub content: String,
    /// Group/position metadata, absent for non-fragmented content.
    pub chunk_info: Option<ChunkInfo>,
}

/// Splits `content` according to `policy`.
///
/// Content of `threshold` characters or fewer yields a single
/// non-fragmented piece. Longer content is cut into slices of at most
/// `chunk_size` characters, each stamped with a freshly generated group id
/// shared across the set, its zero-based index, and the fixed fragment
/// count.
#[must_use]
pub fn chunk(content: &str, policy: &ChunkPolicy) -> Vec<Fragment> {
    let char_count = content.chars().count();
    if char_count <= policy.threshold {
        return vec![Fragment {
            content: content.to_owned(),
            chunk_info: None,
        }];
    }

    let chunk_size = policy.chunk_size.max(1);
    let chars: Vec<char> = content.chars().collect();
    let total = char_count.div_ceil(chunk_size);
    let total_chunks = u32::try_from(total).unwrap_or(u32::MAX);
    let group_id = GroupId::new();

    let mut fragments = Vec::with_capacity(total);
    for (index, slice) in chars.chunks(chunk_size).enumerate() {
        fragments.push(Fragment {
            content: slice.iter().collect(),
            chunk_info: Some(ChunkInfo {
                group_id,
                index: u32::try_from(index).unwrap_or(u32::MAX),
                total_chunks,
            }),
        });
    }
    fragments
}

/// Per-group bookkeeping gathered in a first pass over the rows.
struct GroupState {
    /// First-seen fragment per index (duplicate inserts tolerated).
    by_index: BTreeMap<u32, MessageRow>,
    /// Fragment count fixed at creation, taken from the first-seen
    /// fragment of the group.
    total_chunks: u32,
}

impl GroupState {
    fn is_complete(&self) -> bool {
        self.by_index.len() == self.total_chunks as usize
    }

    /// Concatenates fragment contents in index order into one logical row
    /// carrying the metadata of the first fragment, with `chunk_info`
    /// cleared.
    fn merge(&self) -> Option<MessageRow> {
        let first = self.by_index.values().next()?;
        let mut merged = first.clone();
        merged.content = self
            .by_index
            .values()
            .map(|row| row.content.as_str())
            .collect();
        merged.chunk_info = None;
        Some(merged)
    }
}

/// Merges stored rows into the externally visible logical sequence.
///
/// Rows without chunk metadata pass through in place. For each chunk
/// group, if every fragment is present the group collapses into one
/// logical row at the position of its first stored fragment; a partial
/// group (fragments still in flight, or lost mid-insert) is surfaced
/// fragment by fragment so nothing silently disappears, and a group with
/// malformed metadata (`total_chunks == 0`, out-of-range index) passes
/// through unmodified. Duplicate fragments at the same index keep the
/// first-seen copy. No group is emitted more than once per call.
#[must_use]
pub fn reassemble(rows: Vec<MessageRow>) -> Vec<MessageRow> {
    let mut groups: HashMap<GroupId, GroupState> = HashMap::new();
    for row in &rows {
        let Some(info) = row.chunk_info else { continue };
        if !info.is_wellformed() {
            continue;
        }
        groups
            .entry(info.group_id)
            .or_insert_with(|| GroupState {
                by_index: BTreeMap::new(),
                total_chunks: info.total_chunks,
            })
            .by_index
            .entry(info.index)
            .or_insert_with(|| row.clone());
    }

    let mut emitted: HashSet<GroupId> = HashSet::new();
    let mut seen_indexes: HashSet<(GroupId, u32)> = HashSet::new();
    let mut logical = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(info) = row.chunk_info else {
            logical.push(row);
            continue;
        };
        if !info.is_wellformed() {
            // Malformed metadata: degrade to the raw row.
            logical.push(row);
            continue;
        }
        let Some(group) = groups.get(&info.group_id) else {
            logical.push(row);
            continue;
        };
        if group.is_complete() {
            if emitted.insert(info.group_id)
                && let Some(merged) = group.merge()
            {
                logical.push(merged);
            }
        } else if seen_indexes.insert((info.group_id, info.index)) {
            // Partial group: surface each first-seen fragment individually
            // and defer reconciliation to a later read.
            logical.push(row);
        }
    }
    logical
}
