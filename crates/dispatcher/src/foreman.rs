//! Foreman编排器
//!
//! 调度循环的每一轮：
//!
//! 1. 执行到期的周期任务（定时事件评估、清理已退出的Worker）
//! 2. 检查配置闸门，失败时暂停所有Worker并稍后重试
//! 3. 检查后处理队列积压
//! 4. 等待空闲Worker信号，再等待待处理任务
//! 5. 把任务交给第一个能接受的Worker；找不到时把任务放回队列
//!
//! 所有等待都有上限，并且可以被调和请求或停止信号提前唤醒。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use foreman_core::config::ForemanConfig;
use foreman_core::models::{FrontendMessage, ScheduleTask, WorkerStatus, POST_PROCESSOR_QUEUE_FULL};
use foreman_core::traits::{
    CompletedTaskSink, Dequeued, FrontendMessages, LibraryConfigStore, PendingTaskSource,
    TaskExecutor, WorkerGroupStore,
};
use foreman_core::{ForemanError, ForemanResult};
use foreman_worker::IdleWorkers;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config_gate::{ConfigGate, GateReport};
use crate::event_scheduler::{EventScheduler, ScheduledAction, DEFAULT_MAX_GAP_SECS};
use crate::periodic::{PeriodicJobKind, PeriodicJobs};
use crate::pool::{ReconcileReport, WorkerPool};

/// Foreman依赖的外部协作者
#[derive(Clone)]
pub struct ForemanDeps {
    pub pending: Arc<dyn PendingTaskSource>,
    pub completed: Arc<dyn CompletedTaskSink>,
    pub messages: Arc<dyn FrontendMessages>,
    pub groups: Arc<dyn WorkerGroupStore>,
    pub libraries: Arc<dyn LibraryConfigStore>,
    pub executor: Arc<dyn TaskExecutor>,
}

/// 一轮调度的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched { task_id: i64, worker_id: String },
    /// 没有Worker能接受任务，任务已放回队列
    Requeued { task_id: i64 },
    NoIdleWorker,
    NoTask,
    ConfigInvalid,
    Backpressure,
    /// 等待被调和请求或停止信号打断
    Woken,
    Shutdown,
}

pub struct Foreman {
    config: ForemanConfig,
    deps: ForemanDeps,
    idle: IdleWorkers,
    pool: Mutex<WorkerPool>,
    gate: tokio::sync::Mutex<ConfigGate>,
    scheduler: Mutex<EventScheduler>,
    jobs: Mutex<PeriodicJobs>,
    abort: AtomicBool,
    reconcile_requested: AtomicBool,
    wake: Notify,
}

impl Foreman {
    pub fn new(config: ForemanConfig, deps: ForemanDeps) -> Self {
        let idle = IdleWorkers::new();
        let pool = WorkerPool::new(
            idle.clone(),
            Arc::clone(&deps.executor),
            Arc::clone(&deps.completed),
            config.worker_log_tail_lines,
        );

        let now = Instant::now();
        let mut jobs = PeriodicJobs::new();
        jobs.register(
            PeriodicJobKind::ManageEventSchedules,
            config.schedule_interval(),
            config.job_timeout(),
            now,
        );
        jobs.register(
            PeriodicJobKind::PruneDeadWorkers,
            config.prune_interval(),
            config.job_timeout(),
            now,
        );
        let max_gap = chrono::Duration::from_std(config.schedule_interval())
            .map(|interval| interval + chrono::Duration::minutes(1))
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_MAX_GAP_SECS));
        let scheduler = EventScheduler::new(Local::now().naive_local()).with_max_gap(max_gap);

        Self {
            config,
            deps,
            idle,
            pool: Mutex::new(pool),
            gate: tokio::sync::Mutex::new(ConfigGate::new()),
            scheduler: Mutex::new(scheduler),
            jobs: Mutex::new(jobs),
            abort: AtomicBool::new(false),
            reconcile_requested: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn config(&self) -> &ForemanConfig {
        &self.config
    }

    fn pool(&self) -> MutexGuard<'_, WorkerPool> {
        self.pool.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn scheduler(&self) -> MutexGuard<'_, EventScheduler> {
        self.scheduler.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn jobs(&self) -> MutexGuard<'_, PeriodicJobs> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// 调度循环，直到停止或待处理队列关闭
    pub async fn run(&self) {
        info!("启动Foreman调度循环");

        if let Err(e) = self.reconcile().await {
            error!("初始Worker调和失败: {}", e);
        }
        if !self.validate_worker_config().await {
            self.pause_all_workers(None);
        }

        while !self.is_aborted() {
            match self.dispatch_once().await {
                DispatchOutcome::Shutdown => break,
                DispatchOutcome::Dispatched { task_id, worker_id } => {
                    debug!(task_id, worker_id = %worker_id, "任务已分发");
                }
                outcome => debug!(?outcome, "本轮分发结束"),
            }
        }

        info!("退出Foreman调度循环");
    }

    /// 调度循环的一轮
    pub async fn dispatch_once(&self) -> DispatchOutcome {
        if self.is_aborted() {
            return DispatchOutcome::Shutdown;
        }

        self.run_pending_jobs().await;

        if self.reconcile_requested.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.reconcile().await {
                warn!("请求的Worker调和失败: {}", e);
            }
        }

        if !self.validate_worker_config().await {
            self.pause_all_workers(None);
            self.wait_or_wake(self.config.retry_wait()).await;
            return DispatchOutcome::ConfigInvalid;
        }

        if self.postprocessor_queue_full().await {
            self.wait_or_wake(self.config.retry_wait()).await;
            return DispatchOutcome::Backpressure;
        }

        metrics::gauge!("foreman_idle_workers").set(self.idle.available() as f64);
        let permit = tokio::select! {
            permit = self.idle.acquire(self.config.idle_wait()) => permit,
            _ = self.wake.notified() => return DispatchOutcome::Woken,
        };
        let Some(permit) = permit else {
            return DispatchOutcome::NoIdleWorker;
        };

        if self.is_aborted() {
            return DispatchOutcome::Shutdown;
        }

        let dequeued = tokio::select! {
            dequeued = self.deps.pending.get(self.config.task_wait()) => dequeued,
            _ = self.wake.notified() => return DispatchOutcome::Woken,
        };
        let task = match dequeued {
            Ok(Dequeued::Ready(task)) => task,
            Ok(Dequeued::TimedOut) => return DispatchOutcome::NoTask,
            Ok(Dequeued::Shutdown) => {
                info!("待处理任务来源已关闭");
                return DispatchOutcome::Shutdown;
            }
            Err(e) => {
                warn!("获取待处理任务失败: {}", e);
                return DispatchOutcome::NoTask;
            }
        };

        let task_id = task.id;
        let assigned = self.pool().assign(task);
        permit.consume();

        match assigned {
            Ok(worker_id) => {
                metrics::counter!("foreman_tasks_dispatched_total").increment(1);
                DispatchOutcome::Dispatched { task_id, worker_id }
            }
            Err(task) => {
                warn!(task_id, "没有Worker接受任务，放回队列");
                metrics::counter!("foreman_tasks_requeued_total").increment(1);
                if let Err(e) = self.deps.pending.requeue(task).await {
                    error!(task_id, "任务放回队列失败: {}", e);
                }
                DispatchOutcome::Requeued { task_id }
            }
        }
    }

    async fn wait_or_wake(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
    }

    async fn run_pending_jobs(&self) {
        let due = self.jobs().take_due(Instant::now());
        for job in due {
            let finished = match job.kind {
                PeriodicJobKind::ManageEventSchedules => {
                    tokio::time::timeout(job.timeout, self.manage_event_schedules())
                        .await
                        .map(|_| ())
                }
                PeriodicJobKind::PruneDeadWorkers => {
                    tokio::time::timeout(job.timeout, self.prune_dead_workers())
                        .await
                        .map(|_| ())
                }
            };
            if finished.is_err() {
                warn!(job = %job.kind, "周期任务执行超时");
            }
        }
    }

    /// 停止调度：退出循环，唤醒等待，关闭待处理队列，标记所有Worker为冗余
    pub async fn stop(&self) {
        if self.abort.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("停止Foreman");

        self.idle.release_one();
        if let Err(e) = self.deps.pending.shutdown(true).await {
            warn!("关闭待处理任务来源失败: {}", e);
        }
        let marked = self.pool().mark_all_redundant();
        debug!(marked, "为关闭标记冗余Worker");
        self.wake.notify_one();
    }

    /// 等待所有Worker退出，超时返回 false
    pub async fn wait_for_workers(&self, timeout: Duration) -> bool {
        let waited = tokio::time::timeout(timeout, async {
            loop {
                let live = self.pool().live_count();
                if live == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        waited.is_ok()
    }

    /// 请求调度循环在下一轮开始时重新调和
    pub fn request_reconcile(&self) {
        self.reconcile_requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// 读取Worker组并调和句柄集合
    pub async fn reconcile(&self) -> ForemanResult<ReconcileReport> {
        let groups = self.deps.groups.get_all_worker_groups().await?;
        Ok(self.pool().reconcile(&groups))
    }

    async fn prune_dead_workers(&self) {
        let pruned = self.pool().prune_dead();
        if pruned.is_empty() {
            return;
        }
        debug!(pruned = pruned.len(), "清理已退出的Worker");
        if let Err(e) = self.reconcile().await {
            warn!("清理后Worker调和失败: {}", e);
        }
    }

    pub async fn validate_worker_config(&self) -> bool {
        self.check_worker_config().await.is_valid()
    }

    pub async fn check_worker_config(&self) -> GateReport {
        let mut gate = self.gate.lock().await;
        gate.validate(self.deps.libraries.as_ref(), self.deps.messages.as_ref())
            .await
    }

    /// 后处理队列积压超过 总Worker数 + 1 时暂停分发
    pub async fn postprocessor_queue_full(&self) -> bool {
        let total = match self.get_total_worker_count().await {
            Ok(total) => total,
            Err(e) => {
                warn!("无法读取Worker数量: {}", e);
                return false;
            }
        };
        let limit = total + 1;
        let current = match self.deps.completed.list_processed_tasks().await {
            Ok(count) => count,
            Err(e) => {
                warn!("无法读取后处理队列: {}", e);
                return false;
            }
        };

        let messages = &self.deps.messages;
        if current > limit {
            warn!(
                "后处理队列当前有 {} 个任务，暂停向Worker分发，直到低于 {}",
                current, limit
            );
            if let Err(e) = messages
                .update(FrontendMessage::status(POST_PROCESSOR_QUEUE_FULL))
                .await
            {
                warn!("更新前端消息失败: {}", e);
            }
            return true;
        }

        if let Err(e) = messages.remove_item(POST_PROCESSOR_QUEUE_FULL).await {
            warn!("移除前端消息失败: {}", e);
        }
        false
    }

    /// 所有Worker组配置的Worker数之和
    pub async fn get_total_worker_count(&self) -> ForemanResult<usize> {
        let groups = self.deps.groups.get_all_worker_groups().await?;
        Ok(groups.iter().map(|g| g.number_of_workers).sum())
    }

    pub async fn manage_event_schedules(&self) -> usize {
        self.manage_event_schedules_at(Local::now().naive_local())
            .await
    }

    /// 以给定的本地时间评估定时事件，返回执行的动作数
    pub async fn manage_event_schedules_at(&self, now: NaiveDateTime) -> usize {
        let groups = match self.deps.groups.get_all_worker_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!("无法读取定时事件所需的Worker组: {}", e);
                return 0;
            }
        };
        let actions = self.scheduler().due_actions(&groups, now);

        let mut executed = 0;
        for action in actions {
            if self.run_scheduled_action(&action).await {
                executed += 1;
                metrics::counter!("foreman_schedule_actions_total", "task" => action.task.to_string())
                    .increment(1);
            }
        }

        if executed > 0 {
            if let Err(e) = self.reconcile().await {
                warn!("定时事件后Worker调和失败: {}", e);
            }
        }
        executed
    }

    /// 把定时事件的检查起点设为给定时间
    pub fn reset_schedule_checkpoint(&self, last_checked: NaiveDateTime) {
        self.scheduler().reset(last_checked);
    }

    async fn run_scheduled_action(&self, action: &ScheduledAction) -> bool {
        let group_id = action.worker_group_id;
        match action.task {
            ScheduleTask::Pause => {
                info!(worker_group = %action.worker_group_name, "执行定时事件：暂停所有Worker");
                self.pause_all_workers(Some(group_id));
                true
            }
            ScheduleTask::Resume => {
                info!(worker_group = %action.worker_group_name, "执行定时事件：恢复所有Worker");
                self.resume_all_workers(Some(group_id));
                true
            }
            ScheduleTask::Count => {
                let Some(count) = action.worker_count else {
                    warn!(worker_group = %action.worker_group_name, "数量定时事件未设置Worker数量");
                    return false;
                };
                info!(
                    worker_group = %action.worker_group_name,
                    "执行定时事件：设置Worker数量为 '{}'", count
                );
                match self.deps.groups.set_number_of_workers(group_id, count).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(worker_group = %action.worker_group_name, "跳过定时的Worker数量变更: {}", e);
                        false
                    }
                }
            }
        }
    }

    fn with_worker<T>(
        &self,
        worker_id: &str,
        f: impl FnOnce(&foreman_worker::WorkerHandle) -> T,
    ) -> ForemanResult<T> {
        let pool = self.pool();
        match pool.get(worker_id) {
            Some(handle) => Ok(f(handle)),
            None => {
                warn!(worker_id, "未找到Worker");
                Err(ForemanError::WorkerNotFound {
                    id: worker_id.to_string(),
                })
            }
        }
    }

    pub fn pause_worker(&self, worker_id: &str) -> ForemanResult<bool> {
        self.with_worker(worker_id, |h| h.pause())
    }

    pub fn resume_worker(&self, worker_id: &str) -> ForemanResult<bool> {
        self.with_worker(worker_id, |h| h.resume())
    }

    /// 标记为冗余，运行中的任务会先完成
    pub fn terminate_worker(&self, worker_id: &str) -> ForemanResult<bool> {
        self.with_worker(worker_id, |h| h.mark_redundant())
    }

    /// 暂停全部（或某个组的）Worker，返回状态发生变化的数量
    pub fn pause_all_workers(&self, worker_group_id: Option<i64>) -> usize {
        self.pool()
            .handles_in(worker_group_id)
            .filter(|h| h.pause())
            .count()
    }

    pub fn resume_all_workers(&self, worker_group_id: Option<i64>) -> usize {
        self.pool()
            .handles_in(worker_group_id)
            .filter(|h| h.resume())
            .count()
    }

    pub fn terminate_all_workers(&self, worker_group_id: Option<i64>) -> usize {
        self.pool()
            .handles_in(worker_group_id)
            .filter(|h| h.mark_redundant())
            .count()
    }

    /// 存活Worker的状态快照
    pub fn get_all_worker_status(&self) -> Vec<WorkerStatus> {
        self.pool()
            .handles()
            .filter(|h| h.is_alive())
            .map(|h| h.status())
            .collect()
    }

    /// 按Worker ID或线程ID查询状态
    pub fn get_worker_status(&self, id: &str) -> Option<WorkerStatus> {
        self.pool().find(id).map(|h| h.status())
    }

    pub fn check_for_idle_workers(&self) -> bool {
        self.pool().handles().any(|h| h.can_accept_work())
    }

    pub fn idle_worker_count(&self) -> usize {
        self.idle.available()
    }

    /// 可接受带有给定标签任务的空闲Worker
    pub async fn fetch_available_worker_ids(&self, tags: &[String]) -> Vec<String> {
        let available: Vec<(String, i64)> = self
            .pool()
            .handles()
            .filter(|h| h.can_accept_work())
            .map(|h| (h.worker_id().to_string(), h.worker_group_id()))
            .collect();

        let mut accepts: HashMap<i64, bool> = HashMap::new();
        let mut result = Vec::new();
        for (worker_id, group_id) in available {
            let accepted = match accepts.get(&group_id) {
                Some(accepted) => *accepted,
                None => {
                    let accepted = match self.deps.groups.get(group_id).await {
                        Ok(group) => group.map_or(true, |group| group.accepts_tags(tags)),
                        Err(e) => {
                            warn!(worker_group_id = group_id, "无法读取Worker组标签: {}", e);
                            continue;
                        }
                    };
                    accepts.insert(group_id, accepted);
                    accepted
                }
            };
            if accepted {
                result.push(worker_id);
            }
        }
        result
    }

    pub async fn get_tags_configured_for_worker(&self, worker_id: &str) -> ForemanResult<Vec<String>> {
        let group_id = self.with_worker(worker_id, |h| h.worker_group_id())?;
        self.deps.groups.get_tags(group_id).await
    }
}
