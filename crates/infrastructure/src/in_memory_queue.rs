use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use async_trait::async_trait;
use foreman_core::models::Task;
use foreman_core::traits::{Dequeued, PendingTaskSource};
use foreman_core::{ForemanError, ForemanResult};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

/// 内存待处理任务队列
///
/// 按优先级出队，优先级相同时先进先出；放回的任务排在同优先级任务之前。
/// 普通关闭后仍可取完剩余任务，立即关闭会丢弃剩余任务。
#[derive(Debug, Default)]
pub struct InMemoryPendingQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    next_seq: i64,
    next_requeue_seq: i64,
    closed: bool,
}

#[derive(Debug)]
struct QueuedTask {
    seq: i64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl InMemoryPendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, task: Task) -> ForemanResult<()> {
        let len = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(ForemanError::QueueShutdown);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            debug!(task_id = task.id, priority = task.priority, "任务已入队");
            state.heap.push(QueuedTask { seq, task });
            state.heap.len()
        };
        metrics::gauge!("foreman_pending_tasks").set(len as f64);
        self.notify.notify_one();
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

#[async_trait]
impl PendingTaskSource for InMemoryPendingQueue {
    async fn get(&self, timeout: Duration) -> ForemanResult<Dequeued> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(entry) = state.heap.pop() {
                    metrics::gauge!("foreman_pending_tasks").set(state.heap.len() as f64);
                    return Ok(Dequeued::Ready(entry.task));
                }
                if state.closed {
                    return Ok(Dequeued::Shutdown);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Dequeued::TimedOut);
            }
        }
    }

    async fn requeue(&self, task: Task) -> ForemanResult<()> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(ForemanError::QueueShutdown);
            }
            state.next_requeue_seq -= 1;
            let seq = state.next_requeue_seq;
            debug!(task_id = task.id, "任务已放回队列");
            state.heap.push(QueuedTask { seq, task });
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn shutdown(&self, immediate: bool) -> ForemanResult<()> {
        {
            let mut state = self.state.lock().await;
            state.closed = true;
            if immediate {
                let dropped = state.heap.len();
                state.heap.clear();
                info!(dropped, "待处理任务队列已立即关闭");
            } else {
                info!(remaining = state.heap.len(), "待处理任务队列已关闭");
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn len(&self) -> usize {
        self.state.lock().await.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn next_id(queue: &InMemoryPendingQueue) -> i64 {
        match queue.get(Duration::from_millis(10)).await.unwrap() {
            Dequeued::Ready(task) => task.id,
            other => panic!("expected a task, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_priority_then_fifo() {
        let queue = InMemoryPendingQueue::new();
        queue.push(Task::new(1, "/a")).await.unwrap();
        queue.push(Task::new(2, "/b").with_priority(5)).await.unwrap();
        queue.push(Task::new(3, "/c")).await.unwrap();

        assert_eq!(next_id(&queue).await, 2);
        assert_eq!(next_id(&queue).await, 1);
        assert_eq!(next_id(&queue).await, 3);
    }

    #[tokio::test]
    async fn test_requeued_task_goes_first() {
        let queue = InMemoryPendingQueue::new();
        queue.push(Task::new(1, "/a")).await.unwrap();
        queue.push(Task::new(2, "/b")).await.unwrap();

        let first = next_id(&queue).await;
        queue.requeue(Task::new(first, "/a")).await.unwrap();
        assert_eq!(next_id(&queue).await, 1);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_times_out_when_empty() {
        let queue = InMemoryPendingQueue::new();
        let result = queue.get(Duration::from_millis(20)).await.unwrap();
        assert_eq!(result, Dequeued::TimedOut);
    }

    #[tokio::test]
    async fn test_waiting_get_receives_pushed_task() {
        let queue = Arc::new(InMemoryPendingQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(Task::new(42, "/late")).await.unwrap();

        let result = consumer.await.unwrap().unwrap();
        assert!(matches!(result, Dequeued::Ready(task) if task.id == 42));
    }

    #[tokio::test]
    async fn test_immediate_shutdown_discards_and_wakes_waiters() {
        let queue = Arc::new(InMemoryPendingQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shutdown(true).await.unwrap();

        assert_eq!(consumer.await.unwrap().unwrap(), Dequeued::Shutdown);
        assert!(queue.push(Task::new(1, "/a")).await.is_err());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_drains_remaining() {
        let queue = InMemoryPendingQueue::new();
        queue.push(Task::new(1, "/a")).await.unwrap();
        queue.shutdown(false).await.unwrap();

        assert_eq!(next_id(&queue).await, 1);
        assert_eq!(
            queue.get(Duration::from_millis(10)).await.unwrap(),
            Dequeued::Shutdown
        );
    }
}
