//! Scheduling tests: priority order, bounded admission, at-most-once dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gateway_core::scheduler::{Priority, PriorityQueue, RequestManager, SubmitOptions};
use gateway_core::{GatewayConfig, GatewayError};

fn config(workers: usize, queue: usize) -> GatewayConfig {
    GatewayConfig {
        rate_limit: 10_000.0,
        bucket_capacity: 10_000.0,
        concurrent_workers: workers,
        max_queue_size: queue,
        cleanup_interval: Duration::ZERO,
        ..Default::default()
    }
}

#[test]
fn priority_queue_orders_by_priority() {
    let mut queue: PriorityQueue<&str> = PriorityQueue::new();

    queue.push("low", Priority::Low);
    queue.push("high", Priority::High);
    queue.push("medium", Priority::Medium);

    assert_eq!(queue.pop(), Some("high"));
    assert_eq!(queue.pop(), Some("medium"));
    assert_eq!(queue.pop(), Some("low"));
}

#[test]
fn priority_queue_fifo_within_same_priority() {
    let mut queue: PriorityQueue<&str> = PriorityQueue::new();

    queue.push("first", Priority::Medium);
    queue.push("second", Priority::Medium);
    queue.push("third", Priority::Medium);

    assert_eq!(queue.pop(), Some("first"));
    assert_eq!(queue.pop(), Some("second"));
    assert_eq!(queue.pop(), Some("third"));
}

#[tokio::test]
async fn single_worker_runs_high_before_low() {
    let manager = RequestManager::new(config(1, 16));
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for (label, priority) in [("low", Priority::Low), ("medium", Priority::Medium), ("high", Priority::High)] {
        let order = order.clone();
        let handle = manager
            .submit(
                move || async move {
                    order.lock().unwrap().push(label);
                    Ok::<_, String>(())
                },
                priority,
            )
            .unwrap();
        handles.push(handle);
    }

    manager.start();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec!["high", "medium", "low"]);
    manager.shutdown().await;
}

#[tokio::test]
async fn submission_beyond_capacity_is_rejected() {
    let manager = RequestManager::new(config(1, 3));

    let mut accepted = Vec::new();
    for i in 0..3 {
        accepted.push(manager.submit(move || async move { Ok::<_, String>(i) }, Priority::Medium).unwrap());
    }
    let err = manager
        .submit(|| async { Ok::<_, String>(99) }, Priority::High)
        .unwrap_err();
    assert_eq!(err, GatewayError::QueueFull { capacity: 3 });
    assert!(err.is_admission_rejection());

    let snap = manager.get_metrics();
    assert_eq!(snap.queue_size, 3);
    assert_eq!(snap.counters.submitted, 3);
    assert_eq!(snap.counters.rejected, 1);
    assert_eq!(snap.counters.circuit_open_count, 0);

    manager.start();
    for (i, handle) in accepted.into_iter().enumerate() {
        assert_eq!(handle.await, Ok(i));
    }
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_payload_runs_at_most_once() {
    let manager = Arc::new(RequestManager::new(config(8, 1000)));
    manager.start();
    let runs: Arc<Mutex<HashMap<usize, usize>>> = Arc::new(Mutex::new(HashMap::new()));

    let mut submitters = Vec::new();
    for chunk in 0..4 {
        let manager = manager.clone();
        let runs = runs.clone();
        submitters.push(tokio::spawn(async move {
            let mut handles = Vec::new();
            for i in 0..50 {
                let key = chunk * 50 + i;
                let runs = runs.clone();
                let handle = manager
                    .submit(
                        move || async move {
                            *runs.lock().unwrap().entry(key).or_insert(0) += 1;
                            tokio::task::yield_now().await;
                            Ok::<_, String>(key)
                        },
                        Priority::from((key % 3) as u8 + 1),
                    )
                    .unwrap();
                handles.push(handle);
            }
            for handle in handles {
                handle.await.unwrap();
            }
        }));
    }
    for submitter in submitters {
        submitter.await.unwrap();
    }

    {
        let runs = runs.lock().unwrap();
        assert_eq!(runs.len(), 200);
        assert!(runs.values().all(|&count| count == 1));
    }
    assert_eq!(manager.get_metrics().counters.processed, 200);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn end_to_end_rate_limited_single_worker() {
    let manager = RequestManager::new(GatewayConfig {
        rate_limit: 2.0,
        bucket_capacity: 2.0,
        max_queue_size: 3,
        concurrent_workers: 1,
        cleanup_interval: Duration::ZERO,
        ..Default::default()
    });
    manager.start();

    // No await between submits, so the worker has not dequeued anything yet.
    let results: Vec<_> = (0..4)
        .map(|_| manager.submit(|| async { Ok::<_, String>(()) }, Priority::High))
        .collect();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(GatewayError::QueueFull { .. })))
        .count();
    assert_eq!(rejected, 1);

    for handle in results.into_iter().flatten() {
        assert_eq!(handle.await, Ok(()));
    }
    let snap = manager.get_metrics();
    assert_eq!(snap.counters.rejected, 1);
    assert_eq!(snap.counters.processed, 3);
    manager.shutdown().await;
}

#[tokio::test]
async fn payload_errors_are_delivered_through_the_handle() {
    let manager = RequestManager::new(config(2, 8));
    manager.start();

    let failing = manager
        .submit(|| async { Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")) }, Priority::Medium)
        .unwrap();
    let fine = manager.submit(|| async { Ok::<_, String>("ok") }, Priority::Medium).unwrap();

    assert_eq!(failing.await, Err(GatewayError::Execution("disk on fire".into())));
    assert_eq!(fine.await, Ok("ok"));
    let snap = manager.get_metrics();
    assert_eq!(snap.counters.failed, 1);
    assert_eq!(snap.counters.processed, 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn cancelled_handle_never_runs() {
    let manager = RequestManager::new(config(1, 8));
    let ran = Arc::new(Mutex::new(false));
    let flag = ran.clone();
    let handle = manager
        .submit(
            move || async move {
                *flag.lock().unwrap() = true;
                Ok::<_, String>(())
            },
            Priority::Low,
        )
        .unwrap();
    handle.cancel();

    manager.start();
    assert_eq!(handle.await, Err(GatewayError::Cancelled));
    assert!(!*ran.lock().unwrap());
    assert_eq!(manager.get_metrics().counters.cancelled, 1);
    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn expired_requests_release_queue_capacity() {
    let manager = RequestManager::new(GatewayConfig {
        cleanup_interval: Duration::from_millis(100),
        ..config(1, 2)
    });
    let options = || SubmitOptions::new(Priority::Low).timeout(Duration::from_millis(10));
    let a = manager.submit_with(|| async { Ok::<_, String>(()) }, options()).unwrap();
    let b = manager.submit_with(|| async { Ok::<_, String>(()) }, options()).unwrap();
    assert!(matches!(
        manager.submit(|| async { Ok::<_, String>(()) }, Priority::Low),
        Err(GatewayError::QueueFull { .. })
    ));

    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.start();
    assert!(manager.get_metrics().sweeper_running);
    for handle in [a, b] {
        assert!(matches!(
            handle.await,
            Err(GatewayError::Timeout { expired_in_queue: true, .. })
        ));
    }
    assert_eq!(manager.get_metrics().counters.expired_in_queue, 2);

    let again = manager.submit(|| async { Ok::<_, String>(()) }, Priority::Low).unwrap();
    assert_eq!(again.await, Ok(()));
    manager.shutdown().await;
}
