use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use foreman_core::config::ExecutorConfig;
use foreman_core::models::Task;
use foreman_core::traits::{ProgressReporter, TaskExecutor, WorkerContext};
use foreman_core::{ForemanError, ForemanResult};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

const ABSPATH_PLACEHOLDER: &str = "{abspath}";

/// 任务结果中保留的stdout末尾行数
pub const OUTPUT_TAIL_LINES: usize = 200;

/// 外部命令执行器
///
/// 对每个任务运行配置的命令，参数中的 `{abspath}` 替换为任务文件路径。
/// stdout和stderr的每一行都写入Worker的日志尾部。
pub struct CommandExecutor {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            name: format!("command:{program}"),
            program,
            args,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    fn build_args(&self, task: &Task) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(ABSPATH_PLACEHOLDER, &task.abspath))
            .collect()
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: &WorkerContext,
        task: &Task,
        reporter: &dyn ProgressReporter,
    ) -> ForemanResult<Option<String>> {
        let args = self.build_args(task);
        info!(
            worker_id = %ctx.worker_id,
            task_id = task.id,
            command = %self.program,
            "执行命令: {:?}", args
        );

        reporter.set_runner_info(&self.name, json!({ "status": "in_progress" }));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                reporter.set_runner_info(&self.name, json!({ "status": "failed" }));
                ForemanError::TaskExecution(format!("failed to start {}: {e}", self.program))
            })?;

        if let Some(pid) = child.id() {
            reporter.set_subprocess_info("pid", json!(pid));
        }
        reporter.set_subprocess_info("command", json!(self.program));

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ForemanError::TaskExecution("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ForemanError::TaskExecution("stderr not captured".to_string()))?;

        let mut output = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
        let read_stdout = drain_lines(stdout, |line| {
            reporter.append_log(&line);
            if output.len() == OUTPUT_TAIL_LINES {
                output.pop_front();
            }
            output.push_back(line);
        });
        let read_stderr = drain_lines(stderr, |line| reporter.append_log(&line));
        tokio::join!(read_stdout, read_stderr);

        let status = child
            .wait()
            .await
            .map_err(|e| ForemanError::TaskExecution(format!("failed to wait for process: {e}")))?;
        reporter.set_subprocess_info("returncode", json!(status.code()));

        debug!(
            worker_id = %ctx.worker_id,
            task_id = task.id,
            exit_code = ?status.code(),
            "命令执行结束"
        );

        if status.success() {
            reporter.set_runner_info(&self.name, json!({ "status": "complete" }));
            Ok((!output.is_empty()).then(|| Vec::from(output).join("\n")))
        } else {
            reporter.set_runner_info(&self.name, json!({ "status": "failed" }));
            Err(ForemanError::TaskExecution(format!(
                "{} exited with {:?}",
                self.program,
                status.code()
            )))
        }
    }
}

/// 逐行读取直到EOF，非UTF-8字节按替换字符解码
///
/// 读取出错时停止，管道始终被读空，子进程不会因写满管道而阻塞。
async fn drain_lines<R: AsyncRead + Unpin>(reader: R, mut on_line: impl FnMut(String)) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                on_line(String::from_utf8_lossy(&buf).into_owned());
            }
        }
    }
}
