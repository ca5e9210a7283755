use super::inventory::Inventory;
use serde::Serialize;
use std::collections::BTreeSet;

/// 同步计划：需要传输到目标的路径与需要在目标删除的路径，均按路径排序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    pub to_transfer: BTreeSet<String>,
    pub to_delete: BTreeSet<String>,
    /// 两边时间戳相同的路径数
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_transfer.is_empty() && self.to_delete.is_empty()
    }
}

/// 比较两份清单
///
/// 源中不存在于目标、或时间戳与目标不同的路径都需要传输。这里只判断是否相等，
/// 源的时间戳总会覆盖目标，即使目标更新。目标中存在而源中不存在的路径需要删除。
pub fn compare_inventories(source: &Inventory, dest: &Inventory) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for (path, &modified_time) in source {
        match dest.get(path) {
            Some(dest_time) if dest_time == modified_time => plan.unchanged += 1,
            Some(dest_time) => {
                tracing::debug!(
                    "文件时间不同: {} (src_time={}, dst_time={})",
                    path,
                    modified_time,
                    dest_time
                );
                plan.to_transfer.insert(path.clone());
            }
            None => {
                plan.to_transfer.insert(path.clone());
            }
        }
    }

    for path in dest.paths() {
        if !source.contains(path) {
            plan.to_delete.insert(path.clone());
        }
    }

    plan
}
