use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use foreman_core::models::{Task, WorkerGroup, MAX_WORKERS_PER_GROUP};
use foreman_core::traits::{CompletedTaskSink, TaskExecutor, WorkerContext};
use foreman_worker::{IdleWorkers, WorkerHandle};
use tracing::{debug, info};

/// 一次调和的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub pruned: Vec<String>,
    pub created: Vec<String>,
    pub marked_redundant: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.pruned.is_empty() && self.created.is_empty() && self.marked_redundant.is_empty()
    }
}

/// Worker句柄集合
///
/// 以Worker ID为键。Worker ID只由组名和位置索引决定，
/// 所以重复调和不会产生新的句柄。
pub struct WorkerPool {
    handles: BTreeMap<String, WorkerHandle>,
    idle: IdleWorkers,
    executor: Arc<dyn TaskExecutor>,
    sink: Arc<dyn CompletedTaskSink>,
    log_tail_lines: usize,
    next_thread_id: u64,
}

impl WorkerPool {
    pub fn new(
        idle: IdleWorkers,
        executor: Arc<dyn TaskExecutor>,
        sink: Arc<dyn CompletedTaskSink>,
        log_tail_lines: usize,
    ) -> Self {
        Self {
            handles: BTreeMap::new(),
            idle,
            executor,
            sink,
            log_tail_lines,
            next_thread_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, worker_id: &str) -> Option<&WorkerHandle> {
        self.handles.get(worker_id)
    }

    /// 按Worker ID或线程ID查找
    pub fn find(&self, id: &str) -> Option<&WorkerHandle> {
        self.handles.get(id).or_else(|| {
            let thread_id: u64 = id.parse().ok()?;
            self.handles.values().find(|h| h.thread_id() == thread_id)
        })
    }

    pub fn handles(&self) -> impl Iterator<Item = &WorkerHandle> {
        self.handles.values()
    }

    /// 属于某个组（或全部）的句柄
    pub fn handles_in(&self, worker_group_id: Option<i64>) -> impl Iterator<Item = &WorkerHandle> {
        self.handles
            .values()
            .filter(move |h| worker_group_id.map_or(true, |id| h.worker_group_id() == id))
    }

    /// 仍然存活的句柄数
    pub fn live_count(&self) -> usize {
        self.handles.values().filter(|h| h.is_alive()).count()
    }

    /// 某个组中存活且未被标记冗余的句柄数
    pub fn active_count(&self, worker_group_id: i64) -> usize {
        self.handles_in(Some(worker_group_id))
            .filter(|h| h.is_alive() && !h.is_redundant())
            .count()
    }

    /// 移除已退出的句柄
    pub fn prune_dead(&mut self) -> Vec<String> {
        let dead: Vec<String> = self
            .handles
            .iter()
            .filter(|(_, handle)| !handle.is_alive())
            .map(|(id, _)| id.clone())
            .collect();
        for worker_id in &dead {
            self.handles.remove(worker_id);
            debug!(worker_id = %worker_id, "清理已退出的Worker");
        }
        dead
    }

    /// 让句柄集合与Worker组配置一致
    pub fn reconcile(&mut self, groups: &[WorkerGroup]) -> ReconcileReport {
        let mut report = ReconcileReport {
            pruned: self.prune_dead(),
            ..Default::default()
        };

        let mut expected: BTreeSet<(i64, String)> = BTreeSet::new();
        for group in groups {
            let Some(worker_group_id) = group.id else {
                continue;
            };
            let desired = group.desired_worker_count();

            for index in 0..desired {
                let worker_id = group.worker_id(index);
                let worker_name = group.worker_name(index);
                expected.insert((worker_group_id, worker_name.clone()));

                if !self.handles.contains_key(&worker_id) {
                    self.start_worker(worker_id.clone(), worker_name, worker_group_id);
                    report.created.push(worker_id);
                }
            }

            for index in desired..MAX_WORKERS_PER_GROUP {
                let worker_id = group.worker_id(index);
                if let Some(handle) = self.handles.get(&worker_id) {
                    if handle.mark_redundant() {
                        report.marked_redundant.push(worker_id);
                    }
                }
            }
        }

        let worker_ids: Vec<String> = self.handles.keys().cloned().collect();
        for worker_id in worker_ids {
            let Some(handle) = self.handles.get(&worker_id) else {
                continue;
            };
            let key = (handle.worker_group_id(), handle.name().to_string());
            if !expected.contains(&key) && handle.mark_redundant() {
                report.marked_redundant.push(worker_id);
            }
        }

        if !report.is_noop() {
            info!(
                created = report.created.len(),
                marked_redundant = report.marked_redundant.len(),
                pruned = report.pruned.len(),
                "Worker池调和完成"
            );
        }
        metrics::counter!("foreman_workers_created_total").increment(report.created.len() as u64);
        metrics::counter!("foreman_workers_redundant_total")
            .increment(report.marked_redundant.len() as u64);
        report
    }

    fn start_worker(&mut self, worker_id: String, worker_name: String, worker_group_id: i64) {
        let thread_id = self.next_thread_id;
        self.next_thread_id += 1;

        let ctx = WorkerContext {
            worker_id,
            worker_name,
            worker_group_id,
            thread_id,
        };
        debug!(worker_id = %ctx.worker_id, thread_id, "启动Worker");
        let handle = WorkerHandle::spawn(
            ctx,
            Arc::clone(&self.executor),
            Arc::clone(&self.sink),
            self.idle.clone(),
            self.log_tail_lines,
        );
        self.handles.insert(handle.worker_id().to_string(), handle);
    }

    /// 把任务交给第一个能接受的Worker，没有可用Worker时原样返回任务
    pub fn assign(&self, task: Task) -> Result<String, Task> {
        let mut task = task;
        for handle in self.handles.values() {
            if !handle.can_accept_work() {
                continue;
            }
            match handle.try_assign(task) {
                Ok(()) => return Ok(handle.worker_id().to_string()),
                Err(returned) => task = returned,
            }
        }
        Err(task)
    }

    pub fn mark_all_redundant(&self) -> usize {
        self.handles
            .values()
            .filter(|handle| handle.mark_redundant())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use foreman_core::traits::ProgressReporter;
    use foreman_core::{ForemanError, ForemanResult};
    use foreman_infrastructure::InMemoryCompletedTasks;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    struct GatedExecutor {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl TaskExecutor for GatedExecutor {
        fn name(&self) -> &str {
            "gated"
        }

        async fn execute(
            &self,
            _ctx: &WorkerContext,
            _task: &Task,
            _reporter: &dyn ProgressReporter,
        ) -> ForemanResult<Option<String>> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| ForemanError::Internal(e.to_string()))?;
            permit.forget();
            Ok(None)
        }
    }

    fn pool() -> (WorkerPool, Arc<Semaphore>, IdleWorkers) {
        let gate = Arc::new(Semaphore::new(0));
        let idle = IdleWorkers::new();
        let pool = WorkerPool::new(
            idle.clone(),
            Arc::new(GatedExecutor {
                gate: Arc::clone(&gate),
            }),
            Arc::new(InMemoryCompletedTasks::new()),
            10,
        );
        (pool, gate, idle)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let (mut pool, _gate, idle) = pool();
        let groups = vec![WorkerGroup::new("default", 3).with_id(1)];

        let report = pool.reconcile(&groups);
        assert_eq!(report.created, vec!["default-0", "default-1", "default-2"]);
        assert_eq!(pool.active_count(1), 3);
        assert_eq!(idle.available(), 3);

        assert!(pool.reconcile(&groups).is_noop());
        assert_eq!(pool.len(), 3);
    }

    #[tokio::test]
    async fn test_shrinking_group_marks_highest_indices_redundant() {
        let (mut pool, _gate, _idle) = pool();
        pool.reconcile(&[WorkerGroup::new("default", 3).with_id(1)]);

        let report = pool.reconcile(&[WorkerGroup::new("default", 1).with_id(1)]);
        assert_eq!(report.marked_redundant, vec!["default-1", "default-2"]);
        assert_eq!(pool.active_count(1), 1);

        wait_until(|| pool.live_count() == 1).await;
        let report = pool.reconcile(&[WorkerGroup::new("default", 1).with_id(1)]);
        assert_eq!(report.pruned, vec!["default-1", "default-2"]);
        assert!(report.created.is_empty());
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_removed_group_workers_become_redundant() {
        let (mut pool, _gate, _idle) = pool();
        pool.reconcile(&[
            WorkerGroup::new("default", 1).with_id(1),
            WorkerGroup::new("gpu", 2).with_id(2),
        ]);
        assert_eq!(pool.len(), 3);

        let report = pool.reconcile(&[WorkerGroup::new("default", 1).with_id(1)]);
        assert_eq!(report.marked_redundant, vec!["gpu-0", "gpu-1"]);
        assert_eq!(pool.active_count(2), 0);
        assert_eq!(pool.active_count(1), 1);
    }

    #[tokio::test]
    async fn test_running_worker_is_not_killed_when_redundant() {
        let (mut pool, gate, _idle) = pool();
        pool.reconcile(&[WorkerGroup::new("default", 1).with_id(1)]);

        let worker_id = pool.assign(Task::new(7, "/library/a.mkv")).unwrap();
        assert_eq!(worker_id, "default-0");
        wait_until(|| pool.get("default-0").is_some_and(|h| !h.is_idle())).await;

        pool.reconcile(&[WorkerGroup::new("default", 0).with_id(1)]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let handle = pool.get("default-0").unwrap();
        assert!(handle.is_alive());
        assert!(handle.is_redundant());
        assert_eq!(handle.status().current_task, Some(7));

        gate.add_permits(1);
        wait_until(|| pool.live_count() == 0).await;
    }

    #[tokio::test]
    async fn test_assign_skips_busy_workers_and_returns_task_when_none_free() {
        let (mut pool, _gate, _idle) = pool();
        pool.reconcile(&[WorkerGroup::new("default", 2).with_id(1)]);

        assert_eq!(pool.assign(Task::new(1, "/a")).unwrap(), "default-0");
        assert_eq!(pool.assign(Task::new(2, "/b")).unwrap(), "default-1");
        let returned = pool.assign(Task::new(3, "/c")).unwrap_err();
        assert_eq!(returned.id, 3);
    }

    #[tokio::test]
    async fn test_find_by_worker_or_thread_id() {
        let (mut pool, _gate, _idle) = pool();
        pool.reconcile(&[WorkerGroup::new("default", 2).with_id(1)]);

        assert_eq!(pool.find("default-1").unwrap().thread_id(), 2);
        assert_eq!(pool.find("1").unwrap().worker_id(), "default-0");
        assert!(pool.find("99").is_none());
    }

    #[tokio::test]
    async fn test_renamed_group_replaces_its_workers() {
        let (mut pool, _gate, _idle) = pool();
        pool.reconcile(&[WorkerGroup::new("default", 2).with_id(1)]);

        let report = pool.reconcile(&[WorkerGroup::new("encode", 2).with_id(1)]);
        assert_eq!(report.created, vec!["encode-0", "encode-1"]);
        let mut redundant = report.marked_redundant.clone();
        redundant.sort();
        assert_eq!(redundant, vec!["default-0", "default-1"]);
        assert_eq!(pool.active_count(1), 2);

        wait_until(|| pool.live_count() == 2).await;
        let report = pool.reconcile(&[WorkerGroup::new("encode", 2).with_id(1)]);
        assert!(report.created.is_empty());
        assert_eq!(pool.len(), 2);
        assert!(pool.get("encode-0").is_some());
        assert!(pool.get("default-0").is_none());
    }

    #[tokio::test]
    async fn test_worker_count_above_limit_is_capped() {
        let (mut pool, _gate, _idle) = pool();
        let groups = vec![WorkerGroup::new("default", 15).with_id(1)];

        let report = pool.reconcile(&groups);
        assert_eq!(report.created.len(), MAX_WORKERS_PER_GROUP);
        assert_eq!(report.created.last().map(String::as_str), Some("default-11"));
        assert_eq!(pool.active_count(1), MAX_WORKERS_PER_GROUP);

        assert!(pool.reconcile(&groups).is_noop());
        assert_eq!(pool.len(), MAX_WORKERS_PER_GROUP);
    }
}
