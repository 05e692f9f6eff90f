use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::Worker;

/// 集群状态的不可变快照
///
/// 以Worker名称为键有序存储，遍历顺序稳定。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetSnapshot {
    workers: BTreeMap<String, Worker>,
    taken_at: Option<DateTime<Utc>>,
}

impl FleetSnapshot {
    pub fn new(workers: impl IntoIterator<Item = Worker>) -> Self {
        Self {
            workers: workers.into_iter().map(|w| (w.name.clone(), w)).collect(),
            taken_at: Some(Utc::now()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Worker> {
        self.workers.get(name)
    }

    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    /// 可参与调度的Worker
    pub fn eligible(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values().filter(|w| w.is_eligible())
    }

    pub fn active_count(&self) -> usize {
        self.workers.values().filter(|w| w.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        self.taken_at
    }

    /// 基于当前快照修改出一个新快照
    pub fn with_changes(&self, change: impl FnOnce(&mut BTreeMap<String, Worker>)) -> Self {
        let mut workers = self.workers.clone();
        change(&mut workers);
        Self {
            workers,
            taken_at: Some(Utc::now()),
        }
    }
}
