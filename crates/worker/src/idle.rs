//! 空闲Worker计数信号
//!
//! 每个许可代表一个已知可接受任务的Worker。Worker变为空闲时加一，
//! 调度循环把任务交给Worker后消耗一个许可。暂停或标记冗余的空闲
//! Worker会尝试收回自己的许可；收回失败时留下的多余许可会在调度
//! 循环找不到可用Worker时被丢弃。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct IdleWorkers {
    semaphore: Arc<Semaphore>,
}

/// 调度循环持有的一个空闲信号
///
/// 丢弃时归还信号；调用 [`IdlePermit::consume`] 表示信号已被使用。
#[derive(Debug)]
pub struct IdlePermit {
    permit: OwnedSemaphorePermit,
}

impl IdlePermit {
    pub fn consume(self) {
        self.permit.forget();
    }
}

impl IdleWorkers {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(0)),
        }
    }

    /// 登记一个空闲Worker
    pub fn signal(&self) {
        self.semaphore.add_permits(1);
    }

    /// 在超时时间内等待一个空闲信号
    pub async fn acquire(&self, timeout: Duration) -> Option<IdlePermit> {
        match tokio::time::timeout(timeout, Arc::clone(&self.semaphore).acquire_owned()).await {
            Ok(Ok(permit)) => Some(IdlePermit { permit }),
            _ => None,
        }
    }

    /// 收回一个未被调度循环持有的空闲信号
    pub fn try_reclaim(&self) -> bool {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// 停止时强制释放一次，唤醒正在等待的调度循环
    pub fn release_one(&self) {
        self.semaphore.add_permits(1);
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for IdleWorkers {
    fn default() -> Self {
        Self::new()
    }
}
