//! 外部协作者的内存实现
//!
//! 供二进制程序在没有外部服务时独立运行，也用于集成测试。

pub mod completed_tasks;
pub mod frontend_messages;
pub mod in_memory_queue;
pub mod stores;

pub use completed_tasks::InMemoryCompletedTasks;
pub use frontend_messages::InMemoryFrontendMessages;
pub use in_memory_queue::InMemoryPendingQueue;
pub use stores::{InMemoryLibraryStore, InMemoryWorkerGroupStore};
