use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 待处理任务
///
/// 表示等待分配给Worker的一个工作单元。Foreman不解析任务内容，
/// 只负责选择Worker并把完成结果转交给完成队列。
///
/// # 字段说明
///
/// - `id`: 任务的唯一标识符
/// - `abspath`: 待处理文件的绝对路径
/// - `library_id`: 产生该任务的媒体库
/// - `priority`: 优先级，数值越大越先出队
/// - `tags`: 媒体库标签，用于匹配Worker组
/// - `created_at`: 入队时间
///
/// # 使用示例
///
/// ```rust
/// use foreman_core::models::Task;
///
/// let task = Task::new(1, "/library/movies/big_buck_bunny.mkv")
///     .with_priority(10)
///     .with_tags(vec!["movies".to_string()]);
/// assert_eq!(task.file_name(), "big_buck_bunny.mkv");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub abspath: String,
    pub library_id: Option<i64>,
    pub priority: i64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: i64, abspath: impl Into<String>) -> Self {
        Self {
            id,
            abspath: abspath.into(),
            library_id: None,
            priority: 0,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_library(mut self, library_id: i64) -> Self {
        self.library_id = Some(library_id);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// 文件名部分，用于状态展示
    pub fn file_name(&self) -> &str {
        self.abspath
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(self.abspath.as_str())
    }
}

/// 任务执行结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub success: bool,
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(worker_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            output: None,
            error_message: None,
            worker_id: worker_id.into(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(
        worker_id: impl Into<String>,
        started_at: DateTime<Utc>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            output: None,
            error_message: Some(error_message.into()),
            worker_id: worker_id.into(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// 执行耗时（秒）
    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// 已完成但尚未被后处理的任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTask {
    pub task: Task,
    pub result: TaskResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_extraction() {
        let task = Task::new(1, "/media/tv/show/episode.mkv");
        assert_eq!(task.file_name(), "episode.mkv");

        let task = Task::new(2, "C:\\media\\clip.mp4");
        assert_eq!(task.file_name(), "clip.mp4");

        let task = Task::new(3, "bare.avi");
        assert_eq!(task.file_name(), "bare.avi");
    }

    #[test]
    fn test_task_result_failure_keeps_message() {
        let started = Utc::now();
        let result = TaskResult::failure("default-0", started, "ffmpeg exited with 1");
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("ffmpeg exited with 1"));
        assert!(result.duration_seconds() >= 0.0);
    }
}
