//! 外部协作者接口
//!
//! Foreman只通过这些trait访问待处理队列、完成队列、前端消息、
//! Worker组存储、媒体库配置存储以及任务执行后端。

pub mod frontend;
pub mod stores;
pub mod task_executor;
pub mod task_queue;

pub use frontend::*;
pub use stores::*;
pub use task_executor::*;
pub use task_queue::*;
