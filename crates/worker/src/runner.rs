use std::sync::{Arc, Mutex};

use chrono::Utc;
use foreman_core::models::{Task, TaskResult, WorkerState};
use foreman_core::traits::{CompletedTaskSink, ProgressReporter, TaskExecutor, WorkerContext};
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use crate::idle::IdleWorkers;
use crate::state::{lock, WorkerShared};

/// 把执行器的进度写入共享状态
#[derive(Clone)]
pub struct SharedReporter {
    shared: Arc<Mutex<WorkerShared>>,
}

impl SharedReporter {
    pub fn new(shared: Arc<Mutex<WorkerShared>>) -> Self {
        Self { shared }
    }
}

impl ProgressReporter for SharedReporter {
    fn set_current_file(&self, file: &str) {
        lock(&self.shared).set_current_file(file);
    }

    fn append_log(&self, line: &str) {
        lock(&self.shared).append_log(line);
    }

    fn set_runner_info(&self, runner: &str, info: Value) {
        lock(&self.shared).set_runner_info(runner, info);
    }

    fn set_subprocess_info(&self, key: &str, value: Value) {
        lock(&self.shared).set_subprocess_info(key, value);
    }
}

enum Next {
    Task(Task),
    Check,
    Closed,
}

/// Worker执行循环
///
/// 等待分配的任务或控制信号，每次唤醒后检查是否需要退出。
/// 任务结果先写入完成队列，然后Worker才回到空闲状态。
pub(crate) struct WorkerRunner {
    pub(crate) ctx: WorkerContext,
    pub(crate) shared: Arc<Mutex<WorkerShared>>,
    pub(crate) assignments: mpsc::Receiver<Task>,
    pub(crate) control: Arc<Notify>,
    pub(crate) executor: Arc<dyn TaskExecutor>,
    pub(crate) sink: Arc<dyn CompletedTaskSink>,
    pub(crate) idle: IdleWorkers,
}

impl WorkerRunner {
    pub(crate) async fn run(mut self) {
        info!(
            worker_id = %self.ctx.worker_id,
            thread_id = self.ctx.thread_id,
            "Worker已启动"
        );

        loop {
            if lock(&self.shared).should_exit() {
                break;
            }

            let next = tokio::select! {
                received = self.assignments.recv() => match received {
                    Some(task) => Next::Task(task),
                    None => Next::Closed,
                },
                _ = self.control.notified() => Next::Check,
            };

            match next {
                Next::Task(task) => self.process(task).await,
                Next::Check => continue,
                Next::Closed => break,
            }
        }

        lock(&self.shared).terminate();
        info!(worker_id = %self.ctx.worker_id, "Worker已退出");
    }

    async fn process(&self, task: Task) {
        let started_at = Utc::now();
        let task_id = task.id;
        info!(
            worker_id = %self.ctx.worker_id,
            task_id,
            file = %task.abspath,
            executor = self.executor.name(),
            "Worker开始处理任务"
        );

        let executor = Arc::clone(&self.executor);
        let reporter = SharedReporter::new(Arc::clone(&self.shared));
        let ctx = self.ctx.clone();
        let job = task.clone();
        let execution =
            tokio::spawn(async move { executor.execute(&ctx, &job, &reporter).await }).await;

        let result = match execution {
            Ok(Ok(output)) => {
                let result = TaskResult::success(&self.ctx.worker_id, started_at);
                match output {
                    Some(output) => result.with_output(output),
                    None => result,
                }
            }
            Ok(Err(e)) => {
                warn!(worker_id = %self.ctx.worker_id, task_id, "任务执行失败: {}", e);
                TaskResult::failure(&self.ctx.worker_id, started_at, e.to_string())
            }
            Err(e) => {
                error!(worker_id = %self.ctx.worker_id, task_id, "任务执行器异常终止: {}", e);
                TaskResult::failure(
                    &self.ctx.worker_id,
                    started_at,
                    format!("executor aborted: {e}"),
                )
            }
        };

        debug!(
            worker_id = %self.ctx.worker_id,
            task_id,
            success = result.success,
            duration_seconds = result.duration_seconds(),
            "任务处理完成"
        );

        if let Err(e) = self.sink.put(task, result).await {
            error!(
                worker_id = %self.ctx.worker_id,
                task_id,
                "推送已完成任务失败: {}", e
            );
        }

        let state = lock(&self.shared).complete();
        if state == WorkerState::Idle {
            self.idle.signal();
        }
    }
}
