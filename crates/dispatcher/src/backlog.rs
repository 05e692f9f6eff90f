//! 积压队列：暂时无法调度的提交按到达顺序排队
//!
//! 提交在队列中当且仅当它尚未被成功转发。出队只发生在转发成功、
//! 过期或提交本身不可用时，后两种情况都会发出 `SubmissionAbandoned` 事件。

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use fleet_core::models::Submission;
use fleet_core::FleetEvent;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

pub struct BacklogQueue {
    items: Mutex<VecDeque<Submission>>,
    /// 未显式设置过期时间的提交使用的存活时间
    default_ttl: Option<Duration>,
    events: broadcast::Sender<FleetEvent>,
}

impl BacklogQueue {
    pub fn new(default_ttl: Option<Duration>, events: broadcast::Sender<FleetEvent>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            default_ttl,
            events,
        }
    }

    /// 加入队尾，返回入队后的队列长度
    pub async fn push(&self, mut submission: Submission) -> usize {
        if submission.expires_at.is_none() {
            if let Some(ttl) = self.default_ttl {
                submission.expires_at = Some(Utc::now() + ttl);
            }
        }

        let mut items = self.items.lock().await;
        items.push_back(submission);
        items.len()
    }

    /// 队首提交的副本
    pub async fn front(&self) -> Option<Submission> {
        self.items.lock().await.front().cloned()
    }

    /// 移除指定提交
    pub async fn remove(&self, id: Uuid) -> Option<Submission> {
        let mut items = self.items.lock().await;
        let position = items.iter().position(|s| s.id == id)?;
        items.remove(position)
    }

    /// 丢弃所有已过期的提交并逐个上报
    pub async fn expire(&self, now: DateTime<Utc>) -> Vec<Submission> {
        let expired: Vec<Submission> = {
            let mut items = self.items.lock().await;
            let (expired, kept): (VecDeque<Submission>, VecDeque<Submission>) =
                items.drain(..).partition(|s| s.is_expired(now));
            *items = kept;
            expired.into_iter().collect()
        };

        for submission in &expired {
            info!(
                "积压提交 {} ({}) 已过期，放弃调度",
                submission.id, submission.sha256
            );
            self.report_abandoned(submission, now);
        }

        expired
    }

    /// 移除无法再被调度的提交并上报
    pub async fn abandon(&self, id: Uuid, now: DateTime<Utc>) -> Option<Submission> {
        let submission = self.remove(id).await?;
        warn!("积压提交 {} ({}) 无法调度，已放弃", submission.id, submission.sha256);
        self.report_abandoned(&submission, now);
        Some(submission)
    }

    fn report_abandoned(&self, submission: &Submission, now: DateTime<Utc>) {
        let _ = self.events.send(FleetEvent::SubmissionAbandoned {
            submission_id: submission.id,
            sha256: submission.sha256.clone(),
            submitted_at: submission.submitted_at,
            expired_at: now,
        });
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.items.lock().await.iter().any(|s| s.id == id)
    }

    /// 按队列顺序返回提交ID
    pub async fn ids(&self) -> Vec<Uuid> {
        self.items.lock().await.iter().map(|s| s.id).collect()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}
