use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use foreman_core::models::{Task, TaskResult, WorkerState};
use foreman_core::traits::{CompletedTaskSink, ProgressReporter, TaskExecutor, WorkerContext};
use foreman_core::{ForemanError, ForemanResult};
use foreman_worker::{IdleWorkers, WorkerHandle};
use tokio::sync::Semaphore;

/// 每个任务都要等测试放行一次才完成
struct GatedExecutor {
    gate: Arc<Semaphore>,
    fail: bool,
}

#[async_trait]
impl TaskExecutor for GatedExecutor {
    fn name(&self) -> &str {
        "gated"
    }

    async fn execute(
        &self,
        _ctx: &WorkerContext,
        task: &Task,
        reporter: &dyn ProgressReporter,
    ) -> ForemanResult<Option<String>> {
        reporter.append_log(&format!("started {}", task.id));
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ForemanError::Internal(e.to_string()))?;
        permit.forget();
        if self.fail {
            return Err(ForemanError::TaskExecution("boom".to_string()));
        }
        Ok(Some(format!("done {}", task.id)))
    }
}

#[derive(Default)]
struct CollectingSink {
    completed: Mutex<Vec<(Task, TaskResult)>>,
}

#[async_trait]
impl CompletedTaskSink for CollectingSink {
    async fn put(&self, task: Task, result: TaskResult) -> ForemanResult<()> {
        self.completed.lock().unwrap().push((task, result));
        Ok(())
    }

    async fn list_processed_tasks(&self) -> ForemanResult<usize> {
        Ok(self.completed.lock().unwrap().len())
    }
}

struct Fixture {
    handle: WorkerHandle,
    idle: IdleWorkers,
    gate: Arc<Semaphore>,
    sink: Arc<CollectingSink>,
}

fn spawn_worker(fail: bool) -> Fixture {
    let gate = Arc::new(Semaphore::new(0));
    let sink = Arc::new(CollectingSink::default());
    let idle = IdleWorkers::new();
    let ctx = WorkerContext {
        worker_id: "default-0".to_string(),
        worker_name: "default-Worker-1".to_string(),
        worker_group_id: 1,
        thread_id: 1,
    };
    let executor = Arc::new(GatedExecutor {
        gate: Arc::clone(&gate),
        fail,
    });
    let handle = WorkerHandle::spawn(ctx, executor, sink.clone(), idle.clone(), 10);
    Fixture {
        handle,
        idle,
        gate,
        sink,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_spawn_registers_idle_signal() {
    let fixture = spawn_worker(false);
    assert_eq!(fixture.idle.available(), 1);
    assert_eq!(fixture.handle.state(), WorkerState::Idle);
    assert!(fixture.handle.can_accept_work());
    assert_eq!(fixture.handle.status().name, "default-Worker-1");
}

#[tokio::test]
async fn test_result_is_pushed_before_worker_goes_idle() {
    let fixture = spawn_worker(false);
    fixture.idle.acquire(Duration::from_millis(10)).await.unwrap().consume();

    fixture.handle.try_assign(Task::new(1, "/media/a.mkv")).unwrap();
    assert_eq!(fixture.handle.state(), WorkerState::Running);
    assert!(fixture.handle.try_assign(Task::new(2, "/media/b.mkv")).is_err());

    let status = fixture.handle.status();
    assert_eq!(status.current_task, Some(1));
    assert_eq!(status.current_file, "a.mkv");

    fixture.gate.add_permits(1);
    let idle = fixture.idle.clone();
    wait_until(|| idle.available() == 1).await;

    assert!(fixture.handle.is_idle());
    let completed = fixture.sink.completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    assert!(completed[0].1.success);
    assert_eq!(completed[0].1.output.as_deref(), Some("done 1"));
}

#[tokio::test]
async fn test_failed_task_travels_through_sink() {
    let fixture = spawn_worker(true);
    fixture.handle.try_assign(Task::new(9, "/media/bad.mkv")).unwrap();
    fixture.gate.add_permits(1);

    let sink = fixture.sink.clone();
    wait_until(|| sink.completed.lock().unwrap().len() == 1).await;

    let completed = fixture.sink.completed.lock().unwrap();
    assert!(!completed[0].1.success);
    assert_eq!(completed[0].1.error_message.as_deref(), Some("Task execution error: boom"));
    drop(completed);
    assert!(fixture.handle.is_alive());
}

#[tokio::test]
async fn test_paused_worker_finishes_task_and_stays_paused() {
    let fixture = spawn_worker(false);
    fixture.idle.acquire(Duration::from_millis(10)).await.unwrap().consume();
    fixture.handle.try_assign(Task::new(1, "/media/a.mkv")).unwrap();

    assert!(fixture.handle.pause());
    assert_eq!(fixture.handle.status().current_task, Some(1));

    fixture.gate.add_permits(1);
    let sink = fixture.sink.clone();
    wait_until(|| sink.completed.lock().unwrap().len() == 1).await;
    let handle = &fixture.handle;
    wait_until(|| handle.is_idle()).await;

    assert_eq!(fixture.handle.state(), WorkerState::Paused);
    assert_eq!(fixture.idle.available(), 0);
    assert!(fixture.handle.try_assign(Task::new(2, "/media/b.mkv")).is_err());

    assert!(fixture.handle.resume());
    assert_eq!(fixture.idle.available(), 1);
    assert!(fixture.handle.can_accept_work());
}

#[tokio::test]
async fn test_pausing_idle_worker_reclaims_signal() {
    let fixture = spawn_worker(false);
    assert!(fixture.handle.pause());
    assert_eq!(fixture.idle.available(), 0);
    assert!(!fixture.handle.pause());
}

#[tokio::test]
async fn test_redundant_idle_worker_exits() {
    let fixture = spawn_worker(false);
    assert!(fixture.handle.mark_redundant());
    assert_eq!(fixture.idle.available(), 0);

    let handle = &fixture.handle;
    wait_until(|| !handle.is_alive()).await;
    assert_eq!(fixture.handle.state(), WorkerState::Terminated);
    assert!(fixture.handle.try_assign(Task::new(1, "/media/a.mkv")).is_err());
}

#[tokio::test]
async fn test_redundant_running_worker_finishes_task() {
    let fixture = spawn_worker(false);
    fixture.idle.acquire(Duration::from_millis(10)).await.unwrap().consume();
    fixture.handle.try_assign(Task::new(5, "/media/a.mkv")).unwrap();

    assert!(fixture.handle.mark_redundant());
    assert_eq!(fixture.handle.state(), WorkerState::RedundantPending);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fixture.handle.is_alive());

    fixture.gate.add_permits(1);
    let handle = &fixture.handle;
    wait_until(|| !handle.is_alive()).await;

    let completed = fixture.sink.completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].0.id, 5);
    assert_eq!(fixture.idle.available(), 0);
}
