//! Scheduled conversation refresh.
//!
//! The realtime layer only ever says "new data may be available"; actual
//! content always comes from re-querying the store. This module makes the
//! resulting polling explicit: a spawned task emits a [`RefreshCue`] at a
//! stated interval with uniform jitter, and forwards cues pushed by the
//! realtime layer onto the same channel. Consumers treat every cue
//! identically — as a prompt to re-invoke the conversation read, never as
//! authoritative content.

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;

use driftchat_proto::message::{ConversationKey, SyncCue};

/// Cadence of the scheduled refresh.
#[derive(Debug, Clone, Copy)]
pub struct RefreshConfig {
    /// Base interval between scheduled cues.
    pub interval: Duration,
    /// Uniform jitter added per tick (0..=jitter), decorrelating clients.
    pub jitter: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            jitter: Duration::from_millis(500),
        }
    }
}

/// Prompt to re-query a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshCue {
    /// The conversation that may have new rows.
    pub conversation: ConversationKey,
}

/// Spawns the refresh task for one conversation.
///
/// Emits a [`RefreshCue`] every `interval + jitter` and forwards any
/// [`SyncCue`] pushed by the realtime layer (for any conversation) as a
/// cue as well. Emission is best-effort: if the consumer is behind, a
/// tick is dropped — the next one carries the same meaning.
///
/// The task ends when the cue channel closes or the push channel ends
/// and the cue receiver is dropped.
pub fn spawn_refresh_task(
    config: RefreshConfig,
    conversation: ConversationKey,
    cue_tx: mpsc::Sender<RefreshCue>,
    mut pushed: mpsc::Receiver<SyncCue>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let jitter_ms = u64::try_from(config.jitter.as_millis()).unwrap_or(u64::MAX);
            let jitter = if jitter_ms == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
            };

            tokio::select! {
                () = tokio::time::sleep(config.interval + jitter) => {
                    if cue_tx
                        .try_send(RefreshCue { conversation: conversation.clone() })
                        .is_err()
                        && cue_tx.is_closed()
                    {
                        break;
                    }
                }
                pushed_cue = pushed.recv() => {
                    let Some(cue) = pushed_cue else {
                        // Push side gone; keep polling on the timer.
                        if cue_tx.is_closed() {
                            break;
                        }
                        continue;
                    };
                    tracing::debug!(conversation = %cue.conversation, "realtime cue received");
                    if cue_tx
                        .try_send(RefreshCue { conversation: cue.conversation })
                        .is_err()
                        && cue_tx.is_closed()
                    {
                        break;
                    }
                }
            }
        }
    })
}
