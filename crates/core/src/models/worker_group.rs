use serde::{Deserialize, Serialize};

use super::EventSchedule;
use crate::{ForemanError, ForemanResult};

/// 每个Worker组支持的最大Worker数量
pub const MAX_WORKERS_PER_GROUP: usize = 12;

/// Worker组
///
/// 命名的Worker容量配置。Foreman只读取该结构，并根据观察到的变化
/// 调整自己的Worker句柄集合。
///
/// # 字段说明
///
/// - `id`: 首次保存前为空
/// - `name`: 系统内唯一，参与Worker ID的派生
/// - `locked`: 锁定的组不允许被删除
/// - `number_of_workers`: 期望的Worker数量（0..=12）
/// - `tags`: 标签过滤，空集合表示接受任何任务
/// - `event_schedules`: 按顺序评估的定时事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerGroup {
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub locked: bool,
    pub number_of_workers: usize,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, rename = "worker_event_schedules", alias = "event_schedules")]
    pub event_schedules: Vec<EventSchedule>,
}

impl WorkerGroup {
    pub fn new(name: impl Into<String>, number_of_workers: usize) -> Self {
        Self {
            id: None,
            name: name.into(),
            locked: false,
            number_of_workers,
            tags: Vec::new(),
            event_schedules: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_schedule(mut self, schedule: EventSchedule) -> Self {
        self.event_schedules.push(schedule);
        self
    }

    /// 实际生效的Worker数量，超过上限的配置按上限处理
    pub fn desired_worker_count(&self) -> usize {
        self.number_of_workers.min(MAX_WORKERS_PER_GROUP)
    }

    pub fn set_number_of_workers(&mut self, count: usize) -> ForemanResult<()> {
        if count > MAX_WORKERS_PER_GROUP {
            return Err(ForemanError::InvalidWorkerCount {
                count,
                max: MAX_WORKERS_PER_GROUP,
            });
        }
        self.number_of_workers = count;
        Ok(())
    }

    /// 位置索引对应的Worker ID，只由组名和索引决定
    pub fn worker_id(&self, index: usize) -> String {
        format!("{}-{}", self.name, index)
    }

    /// 位置索引对应的显示名称（从1开始编号）
    pub fn worker_name(&self, index: usize) -> String {
        format!("{}-Worker-{}", self.name, index + 1)
    }

    /// 是否接受带有给定标签的任务
    pub fn accepts_tags(&self, task_tags: &[String]) -> bool {
        self.tags.is_empty() || self.tags.iter().any(|tag| task_tags.contains(tag))
    }
}
