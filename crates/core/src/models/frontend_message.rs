use serde::{Deserialize, Serialize};

/// 插件配置变更导致Worker暂停
pub const PLUGIN_SETTINGS_CHANGED: &str = "pluginSettingsChangeWorkersStopped";
/// 启用了与插件处理器版本不兼容的插件
pub const INCOMPATIBLE_PLUGINS_ENABLED: &str = "incompatiblePluginsEnabled";
/// 媒体库数量超出当前会话允许的上限
pub const LIBRARY_COUNT_LIMIT_EXCEEDED: &str = "libraryCountLimitExceeded";
/// 后处理队列已满，暂停向Worker分发任务
pub const POST_PROCESSOR_QUEUE_FULL: &str = "pendingTaskHaltedPostProcessorQueueFull";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FrontendMessageType {
    Info,
    Status,
    Warning,
    Error,
}

/// 面向用户的通知消息
///
/// 以 `id` 为键，重复的 put/update/remove 操作都是幂等的。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrontendMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: FrontendMessageType,
    pub code: String,
    pub message: String,
    /// 自动消失的秒数，0表示不自动消失
    pub timeout: u64,
}

impl FrontendMessage {
    /// 以代码作为ID的消息
    pub fn new(message_type: FrontendMessageType, code: &str) -> Self {
        Self {
            id: code.to_string(),
            message_type,
            code: code.to_string(),
            message: String::new(),
            timeout: 0,
        }
    }

    pub fn warning(code: &str) -> Self {
        Self::new(FrontendMessageType::Warning, code)
    }

    pub fn status(code: &str) -> Self {
        Self::new(FrontendMessageType::Status, code)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
