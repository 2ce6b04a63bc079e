//! Integration tests for the offline send queue.
//!
//! Verifies the queue's contract end to end:
//! 1. Messages composed offline are queued, not persisted.
//! 2. A connectivity edge drains the queue in original enqueue order.
//! 3. A poison entry is dropped after three attempts without blocking
//!    healthy entries, and is never attempted a fourth time.

use std::sync::Arc;

use tokio::sync::Mutex;

use driftchat::codec::IdentityCodec;
use driftchat::limit::NoLimit;
use driftchat::pipeline::{ClientIdentity, MessagePipeline, PipelineConfig, SendOutcome};
use driftchat::queue::{
    ConnectivityMonitor, DrainOutcome, OfflineSendQueue, QueueSender, QueuedSend,
};
use driftchat::store::memory::InMemoryStore;
use driftchat::store::{ContentUpdate, MessageStore, StoreError};
use driftchat_proto::message::{ContentType, MessageId, MessageRow, NewRow, UserId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn alice() -> UserId {
    UserId::new("alice")
}

fn bob() -> UserId {
    UserId::new("bob")
}

/// Store that rejects inserts whose content contains a poison marker,
/// recording the content of every insert attempt.
struct PoisonStore {
    inner: InMemoryStore,
    attempts: Mutex<Vec<String>>,
}

impl PoisonStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    async fn attempted_contents(&self) -> Vec<String> {
        self.attempts.lock().await.clone()
    }
}

impl MessageStore for PoisonStore {
    async fn insert_rows(&self, rows: Vec<NewRow>) -> Result<Vec<MessageId>, StoreError> {
        if let Some(first) = rows.first() {
            self.attempts.lock().await.push(first.content.clone());
        }
        if rows.iter().any(|row| row.content.contains("poison")) {
            return Err(StoreError::Unavailable("poisoned write".into()));
        }
        self.inner.insert_rows(rows).await
    }

    async fn query_conversation(
        &self,
        a: &UserId,
        b: &UserId,
        limit: usize,
    ) -> Result<Vec<MessageRow>, StoreError> {
        self.inner.query_conversation(a, b, limit).await
    }

    async fn get(&self, id: &MessageId) -> Result<Option<MessageRow>, StoreError> {
        self.inner.get(id).await
    }

    async fn update_status(
        &self,
        id: &MessageId,
        status: driftchat_proto::message::MessageStatus,
    ) -> Result<(), StoreError> {
        self.inner.update_status(id, status).await
    }

    async fn update_content(&self, id: &MessageId, update: ContentUpdate) -> Result<(), StoreError> {
        self.inner.update_content(id, update).await
    }

    async fn count_unread(
        &self,
        user: &UserId,
        from: Option<&UserId>,
    ) -> Result<usize, StoreError> {
        self.inner.count_unread(user, from).await
    }
}

fn build_pipeline<S: MessageStore>(
    store: Arc<S>,
) -> (
    Arc<MessagePipeline<S>>,
    tokio::sync::mpsc::Receiver<driftchat::pipeline::PipelineEvent>,
) {
    let (pipeline, events, _connectivity) = MessagePipeline::new(
        ClientIdentity::new("alice"),
        store,
        Arc::new(IdentityCodec),
        Arc::new(NoLimit),
        PipelineConfig::default(),
    );
    (Arc::new(pipeline), events)
}

async fn wait_until_empty(pipeline: &MessagePipeline<impl MessageStore>) {
    for _ in 0..200 {
        if pipeline.queue_snapshot().await.is_empty() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("queue never drained");
}

// ---------------------------------------------------------------------------
// Scenario: queue while offline, drain on reconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offline_sends_queue_instead_of_persisting() {
    let store = Arc::new(InMemoryStore::new());
    let (pipeline, _events) = build_pipeline(Arc::clone(&store));

    pipeline.set_online(false);
    for i in 0..3 {
        let outcome = pipeline
            .send(&format!("offline {i}"), ContentType::Text, &bob())
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Queued { .. }));
    }

    assert!(store.is_empty().await);
    let snapshot = pipeline.queue_snapshot().await;
    assert_eq!(snapshot.len(), 3);
    let contents: Vec<&str> = snapshot.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["offline 0", "offline 1", "offline 2"]);
}

#[tokio::test]
async fn reconnect_drains_in_original_order() {
    let store = Arc::new(InMemoryStore::new());
    let (pipeline, _events) = build_pipeline(Arc::clone(&store));
    let drain_task = pipeline.spawn_drain_task();

    pipeline.set_online(false);
    for i in 0..3 {
        pipeline
            .send(&format!("message {i}"), ContentType::Text, &bob())
            .await
            .unwrap();
    }

    pipeline.set_online(true);
    wait_until_empty(&pipeline).await;

    let rows = pipeline.load_conversation(&alice(), &bob()).await.unwrap();
    assert_eq!(rows.len(), 3);
    // Rows keep their enqueue timestamps, so the conversation reads in
    // composition order.
    let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["message 0", "message 1", "message 2"]);

    drain_task.abort();
}

#[tokio::test]
async fn poison_entry_is_dropped_after_three_attempts() {
    let store = Arc::new(PoisonStore::new());
    let (pipeline, _events) = build_pipeline(Arc::clone(&store));

    pipeline.set_online(false);
    pipeline
        .send("first", ContentType::Text, &bob())
        .await
        .unwrap();
    pipeline
        .send("poison pill", ContentType::Text, &bob())
        .await
        .unwrap();
    pipeline
        .send("third", ContentType::Text, &bob())
        .await
        .unwrap();

    pipeline.set_online(true);

    // Pass 1: healthy entries deliver, the poison fails its 1st attempt.
    let DrainOutcome::Completed(report) = pipeline.drain_queue().await else {
        panic!("expected a completed pass");
    };
    assert_eq!(report.sent.len(), 2);
    assert_eq!(report.retained, 1);

    // Passes 2 and 3: the poison exhausts its retry budget.
    pipeline.drain_queue().await;
    let DrainOutcome::Completed(report) = pipeline.drain_queue().await else {
        panic!("expected a completed pass");
    };
    assert_eq!(report.dropped.len(), 1);
    assert_eq!(report.dropped[0].retry_count, 3);

    // Final queue contains 0 entries; the 1st and 3rd were delivered
    // before the 2nd was dropped.
    assert!(pipeline.queue_snapshot().await.is_empty());
    let rows = pipeline.load_conversation(&alice(), &bob()).await.unwrap();
    let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "third"]);

    // Exactly 2 successful inserts + 3 poison attempts, never a fourth.
    let attempts = store.attempted_contents().await;
    assert_eq!(
        attempts.iter().filter(|c| c.contains("poison")).count(),
        3
    );
    assert!(matches!(pipeline.drain_queue().await, DrainOutcome::Empty));
}

#[tokio::test]
async fn failing_twice_then_succeeding_is_never_retried_again() {
    struct FlakyTwice {
        failures_left: std::sync::atomic::AtomicU32,
        attempts: std::sync::atomic::AtomicU32,
    }

    impl QueueSender for FlakyTwice {
        async fn send_queued(&self, _entry: &QueuedSend) -> Result<bool, StoreError> {
            use std::sync::atomic::Ordering;
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Ok(false)
            } else {
                Ok(true)
            }
        }
    }

    let monitor = ConnectivityMonitor::new(true);
    let queue = OfflineSendQueue::new(&monitor);
    queue
        .enqueue("eventually fine".into(), ContentType::Text, bob())
        .await;

    let sender = FlakyTwice {
        failures_left: std::sync::atomic::AtomicU32::new(2),
        attempts: std::sync::atomic::AtomicU32::new(0),
    };

    for _ in 0..5 {
        queue.drain(&sender).await;
    }

    assert!(queue.is_empty().await);
    assert_eq!(
        sender.attempts.load(std::sync::atomic::Ordering::SeqCst),
        3,
        "two failures then a success — never a fourth attempt"
    );
}

#[tokio::test]
async fn concurrent_drains_are_single_flight() {
    /// Sender that parks until released, counting concurrent entrants.
    struct SlowSender {
        in_flight: std::sync::atomic::AtomicU32,
        max_seen: std::sync::atomic::AtomicU32,
    }

    impl QueueSender for SlowSender {
        async fn send_queued(&self, _entry: &QueuedSend) -> Result<bool, StoreError> {
            use std::sync::atomic::Ordering;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    let monitor = ConnectivityMonitor::new(true);
    let queue = Arc::new(OfflineSendQueue::new(&monitor));
    for i in 0..4 {
        queue
            .enqueue(format!("msg {i}"), ContentType::Text, bob())
            .await;
    }

    let sender = Arc::new(SlowSender {
        in_flight: std::sync::atomic::AtomicU32::new(0),
        max_seen: std::sync::atomic::AtomicU32::new(0),
    });

    let a = {
        let queue = Arc::clone(&queue);
        let sender = Arc::clone(&sender);
        tokio::spawn(async move { queue.drain(sender.as_ref()).await })
    };
    let b = {
        let queue = Arc::clone(&queue);
        let sender = Arc::clone(&sender);
        tokio::spawn(async move { queue.drain(sender.as_ref()).await })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    // One drain ran; the other was skipped (or found nothing left).
    let completed = [&a, &b]
        .iter()
        .filter(|o| matches!(o, DrainOutcome::Completed(_)))
        .count();
    assert!(completed >= 1);
    assert!(
        [&a, &b]
            .iter()
            .any(|o| matches!(o, DrainOutcome::AlreadyDraining | DrainOutcome::Empty)),
        "the second drain must be skipped, not interleaved"
    );
    assert_eq!(
        sender.max_seen.load(std::sync::atomic::Ordering::SeqCst),
        1,
        "sends must never interleave"
    );
    assert!(queue.is_empty().await);
}
