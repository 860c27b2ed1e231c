use std::collections::VecDeque;

use async_trait::async_trait;
use foreman_core::models::{CompletedTask, Task, TaskResult};
use foreman_core::traits::CompletedTaskSink;
use foreman_core::ForemanResult;
use tokio::sync::Mutex;
use tracing::debug;

/// 内存完成队列，等待后处理器取走
#[derive(Debug, Default)]
pub struct InMemoryCompletedTasks {
    tasks: Mutex<VecDeque<CompletedTask>>,
}

impl InMemoryCompletedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 后处理器取走最早完成的任务
    pub async fn take_next(&self) -> Option<CompletedTask> {
        let mut tasks = self.tasks.lock().await;
        let next = tasks.pop_front();
        metrics::gauge!("foreman_completed_tasks").set(tasks.len() as f64);
        next
    }

    pub async fn snapshot(&self) -> Vec<CompletedTask> {
        self.tasks.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl CompletedTaskSink for InMemoryCompletedTasks {
    async fn put(&self, task: Task, result: TaskResult) -> ForemanResult<()> {
        let mut tasks = self.tasks.lock().await;
        debug!(
            task_id = task.id,
            worker_id = %result.worker_id,
            success = result.success,
            "任务已移入完成队列"
        );
        tasks.push_back(CompletedTask { task, result });
        metrics::gauge!("foreman_completed_tasks").set(tasks.len() as f64);
        Ok(())
    }

    async fn list_processed_tasks(&self) -> ForemanResult<usize> {
        Ok(self.tasks.lock().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_fifo_backlog() {
        let sink = InMemoryCompletedTasks::new();
        sink.put(Task::new(1, "/a"), TaskResult::success("w-0", Utc::now()))
            .await
            .unwrap();
        sink.put(Task::new(2, "/b"), TaskResult::success("w-1", Utc::now()))
            .await
            .unwrap();
        assert_eq!(sink.list_processed_tasks().await.unwrap(), 2);

        let next = sink.take_next().await.unwrap();
        assert_eq!(next.task.id, 1);
        assert_eq!(sink.list_processed_tasks().await.unwrap(), 1);
    }
}
