//! Tests for the command-handler surface

use std::time::Duration;

use session_gate::core::{work_fn, JobQueue, QueueLimits, UnitOfWork};
use session_gate::infra::InMemoryTierDirectory;
use session_gate::runtime::{
    cancel_all, cancel_download, global_status, global_status_message, status_message,
    submit_for, TokioSpawner,
};

fn queue(max_concurrency: usize, max_queue_depth: usize) -> JobQueue<TokioSpawner> {
    JobQueue::new(
        QueueLimits {
            max_concurrency,
            max_queue_depth,
        },
        TokioSpawner::current(),
    )
}

fn until_cancelled() -> Box<dyn UnitOfWork> {
    work_fn(|cancel| async move {
        cancel.cancelled().await;
        anyhow::bail!("cancelled")
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_submit_messages() {
    let q = queue(1, 5);
    let tiers = InMemoryTierDirectory::with_premium([3]);
    q.start();

    let first = submit_for(&q, &tiers, 1, until_cancelled()).await;
    assert!(first.accepted);
    assert_eq!(first.message, "Download started.");
    assert!(first.handle.is_some());
    settle().await;

    let second = submit_for(&q, &tiers, 2, until_cancelled()).await;
    assert!(second.accepted);
    assert_eq!(second.position, 1);
    assert_eq!(
        second.message,
        "Queued (FREE) at position #1/1. Estimated wait: ~2 minutes."
    );

    let premium = submit_for(&q, &tiers, 3, until_cancelled()).await;
    assert_eq!(premium.position, 1);
    assert_eq!(
        premium.message,
        "Queued (PREMIUM) at position #1/2. Estimated wait: ~2 minutes."
    );

    let duplicate = submit_for(&q, &tiers, 2, until_cancelled()).await;
    assert!(!duplicate.accepted);
    assert_eq!(duplicate.position, 2);
    assert!(duplicate.message.contains("position #2/2"));
    assert!(duplicate.handle.is_none());

    let running = submit_for(&q, &tiers, 1, until_cancelled()).await;
    assert!(!running.accepted);
    assert!(running.message.contains("in progress"));

    assert_eq!(cancel_all(&q).await, 3);
    q.stop().await;
}

#[tokio::test]
async fn test_queue_full_message() {
    let q = queue(1, 1);
    let tiers = InMemoryTierDirectory::new();
    q.start();

    assert!(submit_for(&q, &tiers, 1, until_cancelled()).await.accepted);
    settle().await;
    assert!(submit_for(&q, &tiers, 2, until_cancelled()).await.accepted);

    let full = submit_for(&q, &tiers, 3, until_cancelled()).await;
    assert!(!full.accepted);
    assert!(full.message.starts_with("Download queue is full."));
    assert!(full.message.contains("Active downloads: 1/1, waiting: 1/1"));

    cancel_all(&q).await;
    q.stop().await;
}

#[tokio::test]
async fn test_cancel_messages() {
    let q = queue(1, 5);
    let tiers = InMemoryTierDirectory::new();
    q.start();

    submit_for(&q, &tiers, 1, until_cancelled()).await;
    settle().await;
    submit_for(&q, &tiers, 2, until_cancelled()).await;

    let waiting = cancel_download(&q, 2).await;
    assert!(waiting.success);
    assert_eq!(waiting.message, "Removed from download queue.");

    let active = cancel_download(&q, 1).await;
    assert!(active.success);
    assert_eq!(active.message, "Active download cancelled.");

    let missing = cancel_download(&q, 1).await;
    assert!(!missing.success);
    assert_eq!(missing.message, "No active download or queue entry found.");
    q.stop().await;
}

#[tokio::test]
async fn test_status_messages() {
    let q = queue(1, 5);
    let tiers = InMemoryTierDirectory::with_premium([2]);
    q.start();

    submit_for(&q, &tiers, 1, until_cancelled()).await;
    settle().await;
    submit_for(&q, &tiers, 2, until_cancelled()).await;

    assert!(status_message(&q, 1).starts_with("Your download is currently active."));
    let waiting = status_message(&q, 2);
    assert!(waiting.contains("You're in the queue (PREMIUM)."));
    assert!(waiting.contains("Your position: #1/1"));
    assert!(waiting.contains("Estimated wait: ~2 minutes"));
    assert!(status_message(&q, 9).starts_with("No active downloads."));

    let global = global_status(&q);
    assert_eq!(global.active, 1);
    assert_eq!(global.waiting, 1);
    assert_eq!(global.capacity, 1);
    assert_eq!(global.premium_waiting, 1);
    assert_eq!(global.standard_waiting, 0);
    assert!(global_status_message(&q).contains("Premium in queue: 1"));

    cancel_all(&q).await;
    q.stop().await;
}
