//! Task registry tests through the gateway aggregate.

use std::time::Duration;

use gateway_core::{
    Gateway, GatewayConfig, GatewayError, Priority, SubmitOptions, TaskId, TaskRecord, TaskStatus,
};

fn gateway(queue: usize) -> Gateway<u32> {
    Gateway::new(GatewayConfig {
        rate_limit: 1000.0,
        bucket_capacity: 1000.0,
        concurrent_workers: 1,
        max_queue_size: queue,
        cleanup_interval: Duration::ZERO,
        ..Default::default()
    })
}

async fn wait_terminal(gateway: &Gateway<u32>, id: &TaskId) -> TaskRecord<u32> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let record = gateway.tasks.get_task_status(id).expect("task exists");
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task reached a terminal state")
}

#[tokio::test]
async fn submitted_task_reports_success() {
    let gateway = gateway(8);
    gateway.manager.start();

    let id = gateway
        .submit_task(|| async { Ok::<_, String>(42) }, SubmitOptions::new(Priority::High).name("answer"))
        .unwrap();
    let record = wait_terminal(&gateway, &id).await;
    assert_eq!(record.status, TaskStatus::Success);
    assert_eq!(record.result, Some(42));
    assert!(record.finished_at.unwrap() >= record.created_at);
    gateway.manager.shutdown().await;
}

#[tokio::test]
async fn failing_task_reports_error() {
    let gateway = gateway(8);
    gateway.manager.start();

    let id = gateway.submit_task(|| async { Err::<u32, _>("model missing") }, Priority::Medium).unwrap();
    let record = wait_terminal(&gateway, &id).await;
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.error, Some(GatewayError::Execution("model missing".into())));
    assert_eq!(record.result, None);
    gateway.manager.shutdown().await;
}

#[tokio::test]
async fn cancel_pending_task_then_completed_task() {
    let gateway = gateway(8);

    // Not started, so the task stays pending.
    let pending = gateway.submit_task(|| async { Ok::<_, String>(1) }, Priority::Low).unwrap();
    assert_eq!(gateway.tasks.get_task_status(&pending).unwrap().status, TaskStatus::Pending);
    assert!(gateway.tasks.cancel_task(&pending));
    let record = wait_terminal(&gateway, &pending).await;
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.error, Some(GatewayError::Cancelled));

    gateway.manager.start();
    let done = gateway.submit_task(|| async { Ok::<_, String>(2) }, Priority::Low).unwrap();
    wait_terminal(&gateway, &done).await;
    assert!(!gateway.tasks.cancel_task(&done));
    let record = gateway.tasks.get_task_status(&done).unwrap();
    assert_eq!(record.status, TaskStatus::Success);
    assert_eq!(record.result, Some(2));

    // The cancelled request never ran; the worker resolves it as cancelled.
    gateway.manager.shutdown().await;
    assert_eq!(gateway.manager.get_metrics().counters.processed, 1);
}

#[tokio::test]
async fn rejected_submission_creates_no_task() {
    let gateway = gateway(1);
    gateway.submit_task(|| async { Ok::<_, String>(1) }, Priority::Low).unwrap();
    let err = gateway.submit_task(|| async { Ok::<_, String>(2) }, Priority::High).unwrap_err();
    assert_eq!(err, GatewayError::QueueFull { capacity: 1 });
    assert_eq!(gateway.tasks.len(), 1);
}

#[tokio::test]
async fn task_ids_parse_back() {
    let gateway = gateway(8);
    let id = gateway.submit_task(|| async { Ok::<_, String>(1) }, Priority::Low).unwrap();
    let parsed: TaskId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
    assert!(gateway.tasks.get_task_status(&parsed).is_some());
    assert!("not-a-task-id".parse::<TaskId>().is_err());
}

#[tokio::test(start_paused = true)]
async fn finished_records_expire_with_ttl() {
    let gateway: Gateway<u32> = Gateway::with_task_ttl(
        GatewayConfig {
            rate_limit: 1000.0,
            bucket_capacity: 1000.0,
            concurrent_workers: 1,
            cleanup_interval: Duration::ZERO,
            ..Default::default()
        },
        Duration::from_secs(30),
    );
    gateway.manager.start();
    let id = gateway.submit_task(|| async { Ok::<_, String>(7) }, Priority::Medium).unwrap();
    wait_terminal(&gateway, &id).await;

    assert_eq!(gateway.tasks.purge_expired(), 0);
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(gateway.tasks.purge_expired(), 1);
    assert!(gateway.tasks.get_task_status(&id).is_none());
    gateway.manager.shutdown().await;
}
