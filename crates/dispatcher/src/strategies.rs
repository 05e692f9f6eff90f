use fleet_core::models::{FleetSnapshot, PopulationTier, Worker};
use tracing::debug;

/// Worker选择策略
pub trait WorkerSelectionStrategy: Send + Sync {
    /// 从快照中选出一个Worker，没有合适的Worker时返回 None
    fn select_worker<'a>(&self, snapshot: &'a FleetSnapshot) -> Option<&'a Worker>;

    fn name(&self) -> &str;
}

/// 按负载层级排序的选择策略
///
/// 只考虑已被观测过的 active Worker，HIGH 层级视为已饱和。排序键依次为
/// 层级、待处理任务数、Worker名称，同一快照总是选出同一个Worker。
#[derive(Debug, Default)]
pub struct TierRankedStrategy;

impl TierRankedStrategy {
    pub fn new() -> Self {
        Self
    }

    fn accepts(worker: &Worker) -> bool {
        worker.is_eligible() && worker.tier() < PopulationTier::High
    }
}

impl WorkerSelectionStrategy for TierRankedStrategy {
    fn select_worker<'a>(&self, snapshot: &'a FleetSnapshot) -> Option<&'a Worker> {
        let selected = snapshot
            .workers()
            .filter(|worker| Self::accepts(worker))
            .min_by(|a, b| {
                a.tier()
                    .cmp(&b.tier())
                    .then(a.pending_count.cmp(&b.pending_count))
                    .then_with(|| a.name.cmp(&b.name))
            });

        match selected {
            Some(worker) => debug!(
                "层级策略选择Worker: {} (层级: {}, 待处理: {})",
                worker.name,
                worker.tier(),
                worker.pending_count
            ),
            None => debug!("没有可用的Worker节点"),
        }

        selected
    }

    fn name(&self) -> &str {
        "TierRanked"
    }
}

/// 按配置名称创建策略
pub fn strategy_from_name(name: &str) -> Option<Box<dyn WorkerSelectionStrategy>> {
    match name {
        "tier_ranked" => Some(Box::new(TierRankedStrategy::new())),
        _ => None,
    }
}
