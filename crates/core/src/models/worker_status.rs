use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Worker生命周期状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// 空闲，等待分配任务
    Idle,
    /// 正在执行任务
    Running,
    /// 已暂停，不接受新任务（运行中的任务会完成）
    Paused,
    /// 冗余，完成当前任务后退出
    RedundantPending,
    /// 冗余，立即退出（只有空闲时才能进入）
    RedundantImmediate,
    /// 已退出
    Terminated,
}

impl WorkerState {
    /// 检查是否允许转换到目标状态
    pub fn can_transition_to(&self, target: WorkerState) -> bool {
        use WorkerState::*;

        matches!(
            (self, target),
            (Idle, Running) | (Running, Idle) |
            (Idle, Paused) | (Running, Paused) |
            (Paused, Idle) | (Paused, Running) |
            (Idle, RedundantPending) | (Running, RedundantPending) | (Paused, RedundantPending) |
            (Idle, RedundantImmediate) | (Paused, RedundantImmediate) |
            (RedundantPending, RedundantImmediate) |
            (RedundantPending, Terminated) | (RedundantImmediate, Terminated)
        )
    }

    pub fn is_redundant(&self) -> bool {
        matches!(self, Self::RedundantPending | Self::RedundantImmediate)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::RedundantPending => "redundant_pending",
            Self::RedundantImmediate => "redundant_immediate",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Worker状态快照
///
/// 字段名与前端接口约定一致，可以直接序列化返回。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerStatus {
    pub id: String,
    pub name: String,
    pub thread_id: u64,
    pub worker_group_id: i64,
    pub state: WorkerState,
    pub idle: bool,
    pub paused: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub current_file: String,
    pub current_task: Option<i64>,
    pub worker_log_tail: Vec<String>,
    pub runners_info: serde_json::Map<String, serde_json::Value>,
    pub subprocess: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_redundancy_requires_idle() {
        assert!(WorkerState::Idle.can_transition_to(WorkerState::RedundantImmediate));
        assert!(!WorkerState::Running.can_transition_to(WorkerState::RedundantImmediate));
        assert!(WorkerState::Running.can_transition_to(WorkerState::RedundantPending));
    }

    #[test]
    fn test_terminated_is_final() {
        use WorkerState::*;
        for target in [Idle, Running, Paused, RedundantPending, RedundantImmediate, Terminated] {
            assert!(!Terminated.can_transition_to(target));
        }
        assert!(Terminated.is_terminal());
        assert!(!Idle.can_transition_to(Terminated));
    }
}
