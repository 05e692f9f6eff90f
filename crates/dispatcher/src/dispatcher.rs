//! Submission dispatch.
//!
//! A live `dispatch` and a backlog drain both run the same
//! select → forward → record sequence. Live dispatches share the gate with
//! each other; a drain holds it exclusively, so the two never race for the
//! same worker slot off one stale snapshot.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fleet_core::models::{Submission, Task};
use fleet_core::{FleetError, FleetEvent, FleetResult, FleetStore, SandboxClient};
use fleet_infrastructure::FleetMetrics;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::backlog::BacklogQueue;
use crate::registry::FleetRegistry;
use crate::strategies::WorkerSelectionStrategy;

/// 调度结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Dispatched { worker: String, remote_task_id: u64 },
    Queued { backlog_depth: usize },
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched { .. })
    }
}

/// 一次积压队列排空的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub dispatched: usize,
    pub abandoned: usize,
    pub remaining: usize,
}

pub struct Dispatcher {
    registry: Arc<FleetRegistry>,
    store: Arc<dyn FleetStore>,
    client: Arc<dyn SandboxClient>,
    backlog: Arc<BacklogQueue>,
    strategy: Arc<dyn WorkerSelectionStrategy>,
    metrics: Arc<FleetMetrics>,
    events: broadcast::Sender<FleetEvent>,
    gate: RwLock<()>,
    /// 远端已接收但尚未写入存储的任务记录
    unrecorded: Mutex<Vec<Task>>,
    forward_timeout: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<FleetRegistry>,
        store: Arc<dyn FleetStore>,
        client: Arc<dyn SandboxClient>,
        backlog: Arc<BacklogQueue>,
        strategy: Arc<dyn WorkerSelectionStrategy>,
        metrics: Arc<FleetMetrics>,
        events: broadcast::Sender<FleetEvent>,
    ) -> Self {
        Self {
            registry,
            store,
            client,
            backlog,
            strategy,
            metrics,
            events,
            gate: RwLock::new(()),
            unrecorded: Mutex::new(Vec::new()),
            forward_timeout: Duration::from_secs(65),
        }
    }

    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }

    pub fn backlog(&self) -> &Arc<BacklogQueue> {
        &self.backlog
    }

    /// 调度一个提交
    ///
    /// 只有提交本身不合法时返回错误；没有可用Worker或转发失败都会入队并返回 `Queued`。
    pub async fn dispatch(&self, submission: Submission) -> FleetResult<DispatchOutcome> {
        submission
            .validate()
            .map_err(FleetError::InvalidSubmission)?;

        let started = Instant::now();
        {
            let _shared = self.gate.read().await;
            if let Some((worker, remote_task_id)) = self.forward(&submission).await? {
                self.metrics
                    .record_dispatched(&worker, started.elapsed().as_secs_f64());
                return Ok(DispatchOutcome::Dispatched {
                    worker,
                    remote_task_id,
                });
            }
        }

        Ok(self.enqueue(submission).await)
    }

    async fn enqueue(&self, submission: Submission) -> DispatchOutcome {
        let submission_id = submission.id;
        let sha256 = submission.sha256.clone();
        let backlog_depth = self.backlog.push(submission).await;

        info!(
            "没有可用的Worker，提交 {} 进入积压队列 (队列长度: {})",
            sha256, backlog_depth
        );
        self.metrics.record_queued();
        self.metrics.update_backlog_depth(backlog_depth);
        let _ = self.events.send(FleetEvent::SubmissionQueued {
            submission_id,
            sha256,
            backlog_depth,
        });

        DispatchOutcome::Queued { backlog_depth }
    }

    /// 选择Worker并转发，成功后创建任务记录
    ///
    /// 转发失败的Worker在本次调用中被排除，继续尝试排名靠后的Worker。
    /// 返回 `Ok(None)` 表示没有可用Worker或全部转发失败，提交应继续排队。
    async fn forward(&self, submission: &Submission) -> FleetResult<Option<(String, u64)>> {
        let mut excluded: HashSet<String> = HashSet::new();

        loop {
            let snapshot = self.registry.snapshot().await;
            let candidates = if excluded.is_empty() {
                snapshot
            } else {
                Arc::new(snapshot.with_changes(|workers| {
                    workers.retain(|name, _| !excluded.contains(name))
                }))
            };
            let Some(worker) = self.strategy.select_worker(&candidates) else {
                return Ok(None);
            };
            let worker = worker.clone();
            drop(candidates);

            let result = match tokio::time::timeout(
                self.forward_timeout,
                self.client.submit(&worker, submission),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FleetError::forward_failed(&worker.name, "转发超时")),
            };

            match result {
                Ok(remote_task_id) => {
                    self.registry.note_assignment(&worker.name).await;

                    let task =
                        Task::accepted(submission, &worker.name, &worker.host, remote_task_id);
                    self.record_task(task).await;

                    info!(
                        "提交 {} 已转发到Worker {}，远端任务ID: {}",
                        submission.sha256, worker.name, remote_task_id
                    );
                    let _ = self.events.send(FleetEvent::SubmissionDispatched {
                        submission_id: submission.id,
                        sha256: submission.sha256.clone(),
                        worker: worker.name.clone(),
                        remote_task_id,
                    });
                    return Ok(Some((worker.name, remote_task_id)));
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "转发提交 {} 到Worker {} 失败，尝试下一个Worker: {}",
                        submission.sha256, worker.name, e
                    );
                    self.metrics.record_forward_failure(&worker.name);
                    self.registry.record_failure(&worker.name).await;
                    excluded.insert(worker.name);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn record_task(&self, task: Task) {
        if let Err(e) = self.store.create_task(&task).await {
            error!(
                "写入任务记录失败 (sha256: {}, 远端任务ID: {})，稍后重试: {}",
                task.sha256, task.remote_task_id, e
            );
            self.unrecorded.lock().await.push(task);
        }
    }

    /// 重试写入之前失败的任务记录
    async fn flush_unrecorded(&self) {
        let pending: Vec<Task> = std::mem::take(&mut *self.unrecorded.lock().await);
        if pending.is_empty() {
            return;
        }

        let mut still_failing = Vec::new();
        for task in pending {
            if let Err(e) = self.store.create_task(&task).await {
                debug!("任务记录 {} 仍无法写入: {}", task.id, e);
                still_failing.push(task);
            }
        }

        if !still_failing.is_empty() {
            warn!("{} 条任务记录仍等待写入", still_failing.len());
        }
        self.unrecorded.lock().await.extend(still_failing);
    }

    pub async fn unrecorded_count(&self) -> usize {
        self.unrecorded.lock().await.len()
    }

    /// 按 FIFO 顺序尝试调度积压的提交
    ///
    /// 先丢弃过期提交；队首提交找不到可用Worker时立即停止，不会越过它调度后面的提交。
    pub async fn drain_backlog(&self, now: DateTime<Utc>) -> DrainReport {
        let _exclusive = self.gate.write().await;
        self.flush_unrecorded().await;

        let mut report = DrainReport {
            abandoned: self.backlog.expire(now).await.len(),
            ..DrainReport::default()
        };

        while let Some(front) = self.backlog.front().await {
            let started = Instant::now();
            match self.forward(&front).await {
                Ok(Some((worker, _))) => {
                    self.backlog.remove(front.id).await;
                    self.metrics
                        .record_dispatched(&worker, started.elapsed().as_secs_f64());
                    report.dispatched += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    error!("积压提交 {} 无法调度: {}", front.sha256, e);
                    if self.backlog.abandon(front.id, now).await.is_some() {
                        report.abandoned += 1;
                    }
                }
            }
        }

        report.remaining = self.backlog.len().await;
        self.metrics.record_abandoned(report.abandoned as u64);
        self.metrics.update_backlog_depth(report.remaining);

        if report.dispatched > 0 || report.abandoned > 0 {
            info!(
                "积压队列排空: 调度 {} 个，放弃 {} 个，剩余 {} 个",
                report.dispatched, report.abandoned, report.remaining
            );
        }
        report
    }
}
