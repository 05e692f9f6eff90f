use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_core::models::{Worker, WorkerStatus};
use fleet_core::{FleetError, FleetEvent, FleetStore, SandboxClient};
use fleet_dispatcher::{
    BacklogQueue, DispatchOutcome, Dispatcher, FleetRegistry, TierRankedStrategy,
};
use fleet_infrastructure::FleetMetrics;
use fleet_testing_utils::{MockFleetStore, MockSandboxClient, SubmissionBuilder, WorkerBuilder};
use tokio::sync::broadcast;

struct Fixture {
    store: MockFleetStore,
    client: MockSandboxClient,
    registry: Arc<FleetRegistry>,
    dispatcher: Arc<Dispatcher>,
    events: broadcast::Receiver<FleetEvent>,
}

async fn fixture(workers: Vec<Worker>) -> Fixture {
    let store = MockFleetStore::with_workers(workers);
    let client = MockSandboxClient::new();
    let (events_tx, events) = broadcast::channel(256);

    let store_dyn: Arc<dyn FleetStore> = Arc::new(store.clone());
    let client_dyn: Arc<dyn SandboxClient> = Arc::new(client.clone());

    let registry = Arc::new(FleetRegistry::new(store_dyn.clone(), 3, events_tx.clone()));
    registry.refresh().await.unwrap();

    let backlog = Arc::new(BacklogQueue::new(None, events_tx.clone()));
    let dispatcher = Arc::new(
        Dispatcher::new(
            registry.clone(),
            store_dyn,
            client_dyn,
            backlog,
            Arc::new(TierRankedStrategy::new()),
            Arc::new(FleetMetrics::new()),
            events_tx,
        )
        .with_forward_timeout(Duration::from_secs(2)),
    );

    Fixture {
        store,
        client,
        registry,
        dispatcher,
        events,
    }
}

fn drain_events(rx: &mut broadcast::Receiver<FleetEvent>) -> Vec<FleetEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_dispatch_picks_least_loaded_worker() {
    let mut fx = fixture(vec![
        WorkerBuilder::new("a").with_pending(10).build(),
        WorkerBuilder::new("b").with_pending(30).build(),
        WorkerBuilder::new("c").with_pending(60).build(),
    ])
    .await;

    let submission = SubmissionBuilder::new().build();
    let outcome = fx.dispatcher.dispatch(submission.clone()).await.unwrap();

    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            worker: "a".to_string(),
            remote_task_id: 1
        }
    );

    let tasks = fx.store.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].worker, "a");
    assert_eq!(tasks[0].host, "a.sandbox.local");
    assert_eq!(tasks[0].remote_task_id, 1);
    assert_eq!(tasks[0].sha256, submission.sha256);

    // 转发成功后先行累加待处理数
    assert_eq!(fx.registry.snapshot().await.get("a").unwrap().pending_count, 11);
    assert!(fx.dispatcher.backlog().is_empty().await);

    let events = drain_events(&mut fx.events);
    assert!(matches!(
        events.as_slice(),
        [FleetEvent::SubmissionDispatched { worker, remote_task_id: 1, .. }] if worker == "a"
    ));
}

#[tokio::test]
async fn test_dispatch_queues_when_every_worker_is_high() {
    let mut fx = fixture(vec![
        WorkerBuilder::new("a").with_pending(55).build(),
        WorkerBuilder::new("b").with_pending(70).build(),
    ])
    .await;

    let outcome = fx
        .dispatcher
        .dispatch(SubmissionBuilder::new().build())
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Queued { backlog_depth: 1 });
    assert_eq!(fx.store.task_count(), 0);
    assert!(fx.client.submissions().is_empty());

    let events = drain_events(&mut fx.events);
    assert!(matches!(
        events.as_slice(),
        [FleetEvent::SubmissionQueued { backlog_depth: 1, .. }]
    ));
}

#[tokio::test]
async fn test_dispatch_queues_when_no_worker_is_eligible() {
    let fx = fixture(vec![
        WorkerBuilder::new("idle").inactive().with_pending(0).build(),
        // 从未被观测过
        WorkerBuilder::new("fresh").build(),
    ])
    .await;

    let outcome = fx
        .dispatcher
        .dispatch(SubmissionBuilder::new().build())
        .await
        .unwrap();

    assert!(!outcome.is_dispatched());
    assert!(fx.client.submissions().is_empty());
}

#[tokio::test]
async fn test_dispatch_rejects_invalid_submission() {
    let fx = fixture(vec![WorkerBuilder::new("a").with_pending(0).build()]).await;

    let result = fx
        .dispatcher
        .dispatch(SubmissionBuilder::new().with_sha256("").build())
        .await;

    assert!(matches!(result, Err(FleetError::InvalidSubmission(_))));
    assert!(fx.dispatcher.backlog().is_empty().await);
    assert_eq!(fx.store.task_count(), 0);
}

#[tokio::test]
async fn test_forward_failure_queues_without_task_record() {
    let fx = fixture(vec![WorkerBuilder::new("a").with_pending(5).build()]).await;
    fx.client.set_rejecting("a", true);

    let submission = SubmissionBuilder::new().build();
    let outcome = fx.dispatcher.dispatch(submission.clone()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Queued { backlog_depth: 1 });
    assert_eq!(fx.store.task_count(), 0);
    assert!(fx.dispatcher.backlog().contains(submission.id).await);
    assert_eq!(fx.registry.consecutive_failures("a").await, 1);
}

#[tokio::test]
async fn test_drain_dispatches_once_capacity_returns() {
    let fx = fixture(vec![WorkerBuilder::new("a").with_pending(60).build()]).await;

    let submission = SubmissionBuilder::new().build();
    fx.dispatcher.dispatch(submission.clone()).await.unwrap();
    assert_eq!(fx.dispatcher.backlog().len().await, 1);

    fx.registry.update_observation("a", 12, Utc::now()).await;
    let report = fx.dispatcher.drain_backlog(Utc::now()).await;

    assert_eq!(report.dispatched, 1);
    assert_eq!(report.abandoned, 0);
    assert_eq!(report.remaining, 0);

    let tasks = fx.store.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].sha256, submission.sha256);
}

#[tokio::test]
async fn test_drain_keeps_fifo_order_after_partial_drain() {
    let fx = fixture(vec![WorkerBuilder::new("a").with_pending(60).build()]).await;

    let first = SubmissionBuilder::new().with_sha256(&"1".repeat(64)).build();
    let second = SubmissionBuilder::new().with_sha256(&"2".repeat(64)).build();
    let third = SubmissionBuilder::new().with_sha256(&"3".repeat(64)).build();
    for submission in [&first, &second, &third] {
        fx.dispatcher.dispatch(submission.clone()).await.unwrap();
    }

    // 48 -> 49 -> 50，两次转发后进入 HIGH
    fx.registry.update_observation("a", 48, Utc::now()).await;
    let report = fx.dispatcher.drain_backlog(Utc::now()).await;

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.remaining, 1);
    assert_eq!(fx.dispatcher.backlog().ids().await, vec![third.id]);

    let forwarded: Vec<String> = fx
        .client
        .submissions()
        .into_iter()
        .map(|(_, s)| s.sha256)
        .collect();
    assert_eq!(forwarded, vec![first.sha256.clone(), second.sha256.clone()]);
}

#[tokio::test]
async fn test_drain_abandons_expired_submissions() {
    let mut fx = fixture(vec![WorkerBuilder::new("a").with_pending(60).build()]).await;

    let stale = SubmissionBuilder::new().expired().build();
    fx.dispatcher.dispatch(stale.clone()).await.unwrap();
    drain_events(&mut fx.events);

    fx.registry.update_observation("a", 0, Utc::now()).await;
    let report = fx.dispatcher.drain_backlog(Utc::now()).await;

    assert_eq!(report.abandoned, 1);
    assert_eq!(report.dispatched, 0);
    assert!(fx.client.submissions().is_empty());
    assert_eq!(fx.store.task_count(), 0);

    let events = drain_events(&mut fx.events);
    assert!(matches!(
        events.as_slice(),
        [FleetEvent::SubmissionAbandoned { submission_id, .. }] if *submission_id == stale.id
    ));
}

#[tokio::test]
async fn test_drain_abandons_submission_that_cannot_be_forwarded() {
    struct UnreadablePayload;

    #[async_trait::async_trait]
    impl SandboxClient for UnreadablePayload {
        async fn fetch_status(
            &self,
            worker: &Worker,
        ) -> fleet_core::FleetResult<fleet_core::SandboxStatus> {
            Err(FleetError::unreachable(&worker.name, "unused"))
        }

        async fn submit(
            &self,
            _worker: &Worker,
            submission: &fleet_core::Submission,
        ) -> fleet_core::FleetResult<u64> {
            Err(FleetError::InvalidSubmission(format!(
                "无法读取 {}",
                submission.payload_path.display()
            )))
        }

        async fn fetch_task_status(
            &self,
            host: &str,
            _remote_task_id: u64,
        ) -> fleet_core::FleetResult<String> {
            Err(FleetError::unreachable(host, "unused"))
        }
    }

    let store = MockFleetStore::with_workers(vec![WorkerBuilder::new("a").with_pending(60).build()]);
    let (events_tx, _events) = broadcast::channel(16);
    let store_dyn: Arc<dyn FleetStore> = Arc::new(store.clone());
    let registry = Arc::new(FleetRegistry::new(store_dyn.clone(), 3, events_tx.clone()));
    registry.refresh().await.unwrap();
    let dispatcher = Dispatcher::new(
        registry.clone(),
        store_dyn,
        Arc::new(UnreadablePayload),
        Arc::new(BacklogQueue::new(None, events_tx.clone())),
        Arc::new(TierRankedStrategy::new()),
        Arc::new(FleetMetrics::new()),
        events_tx,
    );

    dispatcher
        .dispatch(SubmissionBuilder::new().build())
        .await
        .unwrap();
    registry.update_observation("a", 0, Utc::now()).await;

    let report = dispatcher.drain_backlog(Utc::now()).await;
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn test_task_record_retried_after_store_outage() {
    let fx = fixture(vec![WorkerBuilder::new("a").with_pending(3).build()]).await;
    fx.store.set_unavailable(true);

    let outcome = fx
        .dispatcher
        .dispatch(SubmissionBuilder::new().build())
        .await
        .unwrap();

    // 远端已接收，提交不会重新入队
    assert!(outcome.is_dispatched());
    assert!(fx.dispatcher.backlog().is_empty().await);
    assert_eq!(fx.store.task_count(), 0);
    assert_eq!(fx.dispatcher.unrecorded_count().await, 1);

    fx.dispatcher.drain_backlog(Utc::now()).await;
    assert_eq!(fx.dispatcher.unrecorded_count().await, 1);

    fx.store.set_unavailable(false);
    fx.dispatcher.drain_backlog(Utc::now()).await;
    assert_eq!(fx.dispatcher.unrecorded_count().await, 0);
    assert_eq!(fx.store.task_count(), 1);
}

#[tokio::test]
async fn test_inactive_worker_never_selected() {
    let fx = fixture(vec![
        WorkerBuilder::new("a").with_pending(0).inactive().build(),
        WorkerBuilder::new("b").with_pending(40).build(),
    ])
    .await;

    let outcome = fx
        .dispatcher
        .dispatch(SubmissionBuilder::new().build())
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::Dispatched { worker, .. } if worker == "b"));
    assert_eq!(
        fx.registry.snapshot().await.get("a").unwrap().status,
        WorkerStatus::Inactive
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_and_drain_keep_submissions_exclusive() {
    let fx = fixture(vec![WorkerBuilder::new("a").with_pending(45).build()]).await;

    let submissions: Vec<_> = (0..20).map(|_| SubmissionBuilder::new().build()).collect();

    let mut handles = Vec::new();
    for submission in submissions.clone() {
        let dispatcher = fx.dispatcher.clone();
        handles.push(tokio::spawn(async move { dispatcher.dispatch(submission).await }));
    }
    let drainer = {
        let dispatcher = fx.dispatcher.clone();
        tokio::spawn(async move { dispatcher.drain_backlog(Utc::now()).await })
    };

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    drainer.await.unwrap();

    let forwarded: Vec<_> = fx.client.submissions().into_iter().map(|(_, s)| s.id).collect();
    let queued = fx.dispatcher.backlog().ids().await;

    for submission in &submissions {
        let dispatched = forwarded.contains(&submission.id);
        let waiting = queued.contains(&submission.id);
        assert!(dispatched ^ waiting, "提交 {} 状态不唯一", submission.id);
    }
    assert_eq!(fx.store.task_count(), forwarded.len());
}

#[tokio::test]
async fn test_failed_forward_falls_back_to_next_worker() {
    let fx = fixture(vec![
        WorkerBuilder::new("a").with_pending(1).build(),
        WorkerBuilder::new("b").with_pending(10).build(),
    ])
    .await;
    fx.client.set_rejecting("a", true);

    let outcome = fx
        .dispatcher
        .dispatch(SubmissionBuilder::new().build())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            worker: "b".to_string(),
            remote_task_id: 1
        }
    );
    assert!(fx.dispatcher.backlog().is_empty().await);
    assert_eq!(fx.store.tasks()[0].worker, "b");
    assert_eq!(fx.registry.consecutive_failures("a").await, 1);
}

#[tokio::test]
async fn test_drain_skips_worker_that_rejects_uploads() {
    let fx = fixture(vec![
        WorkerBuilder::new("a").with_pending(60).build(),
        WorkerBuilder::new("b").with_pending(60).build(),
    ])
    .await;
    fx.client.set_rejecting("a", true);

    for _ in 0..2 {
        fx.dispatcher
            .dispatch(SubmissionBuilder::new().build())
            .await
            .unwrap();
    }
    assert_eq!(fx.dispatcher.backlog().len().await, 2);

    fx.registry.update_observation("a", 0, Utc::now()).await;
    fx.registry.update_observation("b", 10, Utc::now()).await;
    let report = fx.dispatcher.drain_backlog(Utc::now()).await;

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.remaining, 0);
    assert!(fx.client.submissions().iter().all(|(worker, _)| worker == "b"));
}
