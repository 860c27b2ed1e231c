//! Worker执行后端接口
//!
//! Worker认领任务后，把任务交给 [`TaskExecutor`] 执行直到完成。
//! 执行器通过 [`ProgressReporter`] 把当前文件、日志行、运行器信息
//! 和子进程信息写回Worker的状态快照，Foreman读取快照时不会阻塞执行。

use async_trait::async_trait;
use serde_json::Value;

use crate::models::Task;
use crate::ForemanResult;

/// 执行任务的Worker身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerContext {
    pub worker_id: String,
    pub worker_name: String,
    pub worker_group_id: i64,
    pub thread_id: u64,
}

/// 执行过程中的状态上报
pub trait ProgressReporter: Send + Sync {
    fn set_current_file(&self, file: &str);

    fn append_log(&self, line: &str);

    fn set_runner_info(&self, runner: &str, info: Value);

    fn set_subprocess_info(&self, key: &str, value: Value);
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// 执行任务直到完成，返回输出文本。失败作为错误返回，
    /// 由Worker转换成失败的任务结果。
    async fn execute(
        &self,
        ctx: &WorkerContext,
        task: &Task,
        reporter: &dyn ProgressReporter,
    ) -> ForemanResult<Option<String>>;
}
