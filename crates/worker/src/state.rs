//! Worker运行时状态
//!
//! [`WorkerShared`] 由Worker句柄和执行循环共享，保存控制标志和状态快照
//! 所需的字段。生命周期状态 [`WorkerState`] 由标志推导，所有修改
//! 都在同一把锁下完成，因此"检查空闲并认领"是原子的。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use foreman_core::models::{Task, WorkerState, WorkerStatus};
use foreman_core::traits::WorkerContext;
use serde_json::{Map, Value};
use tracing::warn;

/// 获取共享状态的锁，持锁线程panic后继续使用内部数据
pub(crate) fn lock(shared: &Mutex<WorkerShared>) -> MutexGuard<'_, WorkerShared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// 冗余标记的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redundancy {
    /// 完成当前任务后退出
    Pending,
    /// 立即退出
    Immediate,
}

#[derive(Debug)]
pub struct WorkerShared {
    idle: bool,
    paused: bool,
    redundancy: Option<Redundancy>,
    terminated: bool,
    start_time: Option<DateTime<Utc>>,
    current_task: Option<Task>,
    current_file: String,
    log_tail: VecDeque<String>,
    log_capacity: usize,
    runners_info: Map<String, Value>,
    subprocess: Map<String, Value>,
}

impl WorkerShared {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            idle: true,
            paused: false,
            redundancy: None,
            terminated: false,
            start_time: None,
            current_task: None,
            current_file: String::new(),
            log_tail: VecDeque::new(),
            log_capacity: log_capacity.max(1),
            runners_info: Map::new(),
            subprocess: Map::new(),
        }
    }

    pub fn state(&self) -> WorkerState {
        if self.terminated {
            return WorkerState::Terminated;
        }
        match self.redundancy {
            Some(Redundancy::Immediate) => WorkerState::RedundantImmediate,
            Some(Redundancy::Pending) => WorkerState::RedundantPending,
            None if self.paused => WorkerState::Paused,
            None if self.idle => WorkerState::Idle,
            None => WorkerState::Running,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn redundancy(&self) -> Option<Redundancy> {
        self.redundancy
    }

    pub fn current_task_id(&self) -> Option<i64> {
        self.current_task.as_ref().map(|t| t.id)
    }

    /// 空闲、未暂停、未冗余时才能接受任务
    pub fn can_accept_work(&self) -> bool {
        self.state() == WorkerState::Idle
    }

    /// 执行循环是否应该退出
    pub fn should_exit(&self) -> bool {
        match self.state() {
            WorkerState::RedundantImmediate | WorkerState::Terminated => true,
            WorkerState::RedundantPending => self.idle,
            _ => false,
        }
    }

    fn transition(&mut self, target: WorkerState, apply: impl FnOnce(&mut Self)) -> bool {
        let current = self.state();
        if current == target {
            return false;
        }
        if !current.can_transition_to(target) {
            warn!("拒绝Worker状态转换 {} -> {}", current, target);
            return false;
        }
        apply(self);
        true
    }

    /// 认领任务：Idle -> Running
    pub fn claim(&mut self, task: &Task) -> bool {
        if !self.can_accept_work() {
            return false;
        }
        let task = task.clone();
        self.transition(WorkerState::Running, |s| {
            s.idle = false;
            s.start_time = Some(Utc::now());
            s.current_file = task.file_name().to_string();
            s.current_task = Some(task);
            s.log_tail.clear();
            s.runners_info.clear();
            s.subprocess.clear();
        })
    }

    /// 撤销未能送达Worker的认领
    pub fn abandon_claim(&mut self) {
        self.idle = true;
        self.start_time = None;
        self.current_task = None;
        self.current_file.clear();
    }

    /// 任务完成，返回完成后的状态
    pub fn complete(&mut self) -> WorkerState {
        self.idle = true;
        self.start_time = None;
        self.current_task = None;
        self.current_file.clear();
        self.subprocess.clear();
        self.state()
    }

    /// 暂停。返回暂停前的状态，未发生变化时返回 None
    pub fn pause(&mut self) -> Option<WorkerState> {
        if self.redundancy.is_some() || self.terminated {
            return None;
        }
        let before = self.state();
        self.transition(WorkerState::Paused, |s| s.paused = true)
            .then_some(before)
    }

    /// 恢复。返回恢复后的状态，未发生变化时返回 None
    pub fn resume(&mut self) -> Option<WorkerState> {
        if !self.paused || self.redundancy.is_some() || self.terminated {
            return None;
        }
        let target = if self.idle {
            WorkerState::Idle
        } else {
            WorkerState::Running
        };
        self.transition(target, |s| s.paused = false)
            .then(|| self.state())
    }

    /// 标记冗余：空闲时立即退出，否则完成当前任务后退出。
    /// 返回标记前的状态，未发生变化时返回 None
    pub fn mark_redundant(&mut self) -> Option<WorkerState> {
        if self.terminated {
            return None;
        }
        let before = self.state();
        let target = if self.idle {
            WorkerState::RedundantImmediate
        } else {
            WorkerState::RedundantPending
        };
        let mode = if self.idle {
            Redundancy::Immediate
        } else {
            Redundancy::Pending
        };
        self.transition(target, |s| s.redundancy = Some(mode))
            .then_some(before)
    }

    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn set_current_file(&mut self, file: &str) {
        self.current_file = file.to_string();
    }

    pub fn append_log(&mut self, line: &str) {
        if self.log_tail.len() == self.log_capacity {
            self.log_tail.pop_front();
        }
        self.log_tail.push_back(line.to_string());
    }

    pub fn set_runner_info(&mut self, runner: &str, info: Value) {
        self.runners_info.insert(runner.to_string(), info);
    }

    pub fn set_subprocess_info(&mut self, key: &str, value: Value) {
        self.subprocess.insert(key.to_string(), value);
    }

    pub fn snapshot(&self, ctx: &WorkerContext) -> WorkerStatus {
        WorkerStatus {
            id: ctx.worker_id.clone(),
            name: ctx.worker_name.clone(),
            thread_id: ctx.thread_id,
            worker_group_id: ctx.worker_group_id,
            state: self.state(),
            idle: self.idle,
            paused: self.paused,
            start_time: self.start_time,
            current_file: self.current_file.clone(),
            current_task: self.current_task_id(),
            worker_log_tail: self.log_tail.iter().cloned().collect(),
            runners_info: self.runners_info.clone(),
            subprocess: self.subprocess.clone(),
        }
    }
}
