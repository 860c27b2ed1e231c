use std::sync::{Arc, Mutex};

use foreman_core::models::{Task, WorkerState, WorkerStatus};
use foreman_core::traits::{CompletedTaskSink, TaskExecutor, WorkerContext};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::idle::IdleWorkers;
use crate::runner::WorkerRunner;
use crate::state::{lock, WorkerShared};

/// Foreman持有的Worker句柄
///
/// 句柄只修改文档约定的控制标志（暂停、冗余）并读取状态快照，
/// 任务的实际执行在独立的tokio任务中进行。
pub struct WorkerHandle {
    ctx: WorkerContext,
    shared: Arc<Mutex<WorkerShared>>,
    assignments: mpsc::Sender<Task>,
    control: Arc<Notify>,
    idle: IdleWorkers,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// 启动Worker并登记一个空闲信号
    pub fn spawn(
        ctx: WorkerContext,
        executor: Arc<dyn TaskExecutor>,
        sink: Arc<dyn CompletedTaskSink>,
        idle: IdleWorkers,
        log_tail_lines: usize,
    ) -> Self {
        let shared = Arc::new(Mutex::new(WorkerShared::new(log_tail_lines)));
        let (tx, rx) = mpsc::channel(1);
        let control = Arc::new(Notify::new());

        let runner = WorkerRunner {
            ctx: ctx.clone(),
            shared: Arc::clone(&shared),
            assignments: rx,
            control: Arc::clone(&control),
            executor,
            sink,
            idle: idle.clone(),
        };
        let join = tokio::spawn(runner.run());
        idle.signal();

        Self {
            ctx,
            shared,
            assignments: tx,
            control,
            idle,
            join,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.ctx.worker_id
    }

    pub fn name(&self) -> &str {
        &self.ctx.worker_name
    }

    pub fn worker_group_id(&self) -> i64 {
        self.ctx.worker_group_id
    }

    pub fn thread_id(&self) -> u64 {
        self.ctx.thread_id
    }

    pub fn state(&self) -> WorkerState {
        lock(&self.shared).state()
    }

    pub fn is_alive(&self) -> bool {
        !self.join.is_finished()
    }

    pub fn is_idle(&self) -> bool {
        lock(&self.shared).is_idle()
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.shared).is_paused()
    }

    pub fn is_redundant(&self) -> bool {
        lock(&self.shared).redundancy().is_some()
    }

    pub fn can_accept_work(&self) -> bool {
        self.is_alive() && lock(&self.shared).can_accept_work()
    }

    /// 原子地检查并认领任务，Worker不可用时原样返回任务
    pub fn try_assign(&self, task: Task) -> Result<(), Task> {
        if !self.is_alive() {
            return Err(task);
        }
        if !lock(&self.shared).claim(&task) {
            return Err(task);
        }

        match self.assignments.try_send(task) {
            Ok(()) => {
                debug!(worker_id = %self.ctx.worker_id, "任务已交给Worker");
                Ok(())
            }
            Err(TrySendError::Full(task)) | Err(TrySendError::Closed(task)) => {
                lock(&self.shared).abandon_claim();
                Err(task)
            }
        }
    }

    /// 暂停Worker，运行中的任务会继续执行到完成
    pub fn pause(&self) -> bool {
        let before = lock(&self.shared).pause();
        match before {
            Some(previous) => {
                if previous == WorkerState::Idle {
                    self.idle.try_reclaim();
                }
                self.control.notify_one();
                debug!(worker_id = %self.ctx.worker_id, "Worker已暂停");
                true
            }
            None => false,
        }
    }

    pub fn resume(&self) -> bool {
        let after = lock(&self.shared).resume();
        match after {
            Some(state) => {
                if state == WorkerState::Idle && self.is_alive() {
                    self.idle.signal();
                }
                self.control.notify_one();
                debug!(worker_id = %self.ctx.worker_id, "Worker已恢复");
                true
            }
            None => false,
        }
    }

    /// 标记为冗余：空闲时立即退出，运行中时完成当前任务后退出
    pub fn mark_redundant(&self) -> bool {
        let before = lock(&self.shared).mark_redundant();
        match before {
            Some(previous) => {
                if previous == WorkerState::Idle {
                    self.idle.try_reclaim();
                }
                self.control.notify_one();
                debug!(
                    worker_id = %self.ctx.worker_id,
                    state = %self.state(),
                    "Worker已标记为冗余"
                );
                true
            }
            None => false,
        }
    }

    /// 不阻塞Worker执行的状态快照
    pub fn status(&self) -> WorkerStatus {
        lock(&self.shared).snapshot(&self.ctx)
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("worker_id", &self.ctx.worker_id)
            .field("thread_id", &self.ctx.thread_id)
            .field("state", &self.state())
            .finish()
    }
}
