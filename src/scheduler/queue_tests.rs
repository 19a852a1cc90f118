//! Tests for the bounded admission queue.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::scheduler::{Priority, RequestHandle};

fn small_queue() -> AdmissionQueue {
    AdmissionQueue::new(AdmissionQueueConfig { max_size: 2 })
}

fn req(id: u64, priority: Priority) -> (QueuedRequest, RequestHandle<u64>) {
    QueuedRequest::new(id, format!("req-{id}"), priority, None, move || async move {
        Ok::<_, &str>(id)
    })
}

#[test]
fn queue_full_hands_request_back() {
    let q = small_queue();
    assert_eq!(q.try_push(req(1, Priority::Low).0).unwrap(), 1);
    assert_eq!(q.try_push(req(2, Priority::Low).0).unwrap(), 2);

    let rejected = q.try_push(req(3, Priority::High).0).unwrap_err();
    assert_eq!(rejected.id, 3);
    assert_eq!(q.len(), 2);
}

#[test]
fn zero_capacity_is_floored_to_one() {
    let q = AdmissionQueue::new(AdmissionQueueConfig { max_size: 0 });
    assert_eq!(q.capacity(), 1);
    assert!(q.try_push(req(1, Priority::Low).0).is_ok());
}

#[test]
fn pops_by_priority_then_fifo() {
    let q = AdmissionQueue::new(AdmissionQueueConfig::default());
    for (id, p) in [(1, Priority::Low), (2, Priority::Medium), (3, Priority::High), (4, Priority::Medium)] {
        q.try_push(req(id, p).0).unwrap();
    }
    let order: Vec<u64> = std::iter::from_fn(|| q.try_pop()).map(|e| e.item.id).collect();
    assert_eq!(order, vec![3, 2, 4, 1]);
}

#[test]
fn requeue_restores_original_position() {
    let q = AdmissionQueue::new(AdmissionQueueConfig::default());
    q.try_push(req(1, Priority::Medium).0).unwrap();
    q.try_push(req(2, Priority::Medium).0).unwrap();

    let first = q.try_pop().unwrap();
    q.try_push(req(3, Priority::Medium).0).unwrap();
    q.requeue(first).unwrap();

    let order: Vec<u64> = q.drain().into_iter().map(|r| r.id).collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn requeue_fails_when_full() {
    let q = small_queue();
    q.try_push(req(1, Priority::Medium).0).unwrap();
    let entry = q.try_pop().unwrap();
    q.try_push(req(2, Priority::Medium).0).unwrap();
    q.try_push(req(3, Priority::Medium).0).unwrap();

    let back = q.requeue(entry).unwrap_err();
    assert_eq!(back.id, 1);
}

#[test]
fn remove_where_extracts_cancelled() {
    let q = AdmissionQueue::new(AdmissionQueueConfig::default());
    let (r1, h1) = req(1, Priority::Low);
    let (r2, _h2) = req(2, Priority::Low);
    q.try_push(r1).unwrap();
    q.try_push(r2).unwrap();

    h1.cancel();
    let removed = q.remove_where(|r| r.is_cancelled());
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, 1);
    assert_eq!(q.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn pop_timeout_returns_none_when_idle() {
    let q = small_queue();
    let start = tokio::time::Instant::now();
    assert!(q.pop_timeout(Duration::from_secs(1)).await.is_none());
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn pop_timeout_wakes_on_push() {
    let q = Arc::new(small_queue());
    let waiter = {
        let q = Arc::clone(&q);
        tokio::spawn(async move { q.pop_timeout(Duration::from_secs(5)).await })
    };
    tokio::task::yield_now().await;
    q.try_push(req(9, Priority::High).0).unwrap();

    let entry = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap()
        .expect("entry delivered");
    assert_eq!(entry.item.id, 9);
}

#[tokio::test]
async fn handle_stays_pending_until_delivery() {
    let (request, handle) = req(5, Priority::Medium);
    let mut handle = tokio_test::task::spawn(handle);
    tokio_test::assert_pending!(handle.poll());

    request.run(CancellationToken::new()).await.deliver();
    assert!(handle.is_woken());
    assert_eq!(tokio_test::assert_ready!(handle.poll()), Ok(5));
}
