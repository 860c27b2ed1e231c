//! # 数据模型
//!
//! 定义Foreman编排器使用的核心数据结构：待处理任务、Worker组、定时事件、
//! Worker状态快照、前端通知消息、插件配置以及会话状态。
//!
//! ## 核心模型
//!
//! ### Task - 待处理任务
//! 由外部文件发现流程产生，Foreman只负责将其分配给空闲Worker。
//!
//! ### WorkerGroup - Worker组
//! 命名的Worker容量配置，包含标签过滤与定时事件，由外部配置存储持久化。
//!
//! ### EventSchedule - 定时事件
//! 在指定的挂钟时间对所属Worker组执行暂停、恢复或调整数量。
//!
//! ### WorkerStatus - Worker状态快照
//! Worker执行上下文报告的只读快照，字段名与前端接口保持一致。
//!
//! ## 状态流转
//!
//! ```text
//! Idle → Running → Idle
//!   ↓       ↓
//! Paused  Paused(完成当前任务后)
//!   ↓
//! RedundantPending / RedundantImmediate → Terminated
//! ```

pub mod event_schedule;
pub mod frontend_message;
pub mod plugin_config;
pub mod session;
pub mod task;
pub mod worker_group;
pub mod worker_status;

pub use event_schedule::*;
pub use frontend_message::*;
pub use plugin_config::*;
pub use session::*;
pub use task::*;
pub use worker_group::*;
pub use worker_status::*;
