use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Task, TaskResult};
use crate::ForemanResult;

/// 从待处理队列取任务的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Dequeued {
    Ready(Task),
    TimedOut,
    /// 队列已关闭，不会再有任务
    Shutdown,
}

/// 待处理任务来源
#[async_trait]
pub trait PendingTaskSource: Send + Sync {
    /// 在超时时间内等待下一个任务
    async fn get(&self, timeout: Duration) -> ForemanResult<Dequeued>;

    /// 把已取出但未能分配的任务放回队列
    async fn requeue(&self, task: Task) -> ForemanResult<()>;

    /// 关闭队列。`immediate` 为真时丢弃剩余任务
    async fn shutdown(&self, immediate: bool) -> ForemanResult<()>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// 已完成任务的接收端（交给后处理器）
#[async_trait]
pub trait CompletedTaskSink: Send + Sync {
    async fn put(&self, task: Task, result: TaskResult) -> ForemanResult<()>;

    /// 等待后处理的任务数量
    async fn list_processed_tasks(&self) -> ForemanResult<usize>;
}
