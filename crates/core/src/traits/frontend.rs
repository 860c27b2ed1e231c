use async_trait::async_trait;

use crate::models::FrontendMessage;
use crate::ForemanResult;

/// 前端消息通道
///
/// 按消息ID去重：`put` 只在不存在时插入，`update` 总是覆盖，
/// `remove_item` 删除不存在的ID也不会报错。
#[async_trait]
pub trait FrontendMessages: Send + Sync {
    async fn put(&self, message: FrontendMessage) -> ForemanResult<()>;

    async fn update(&self, message: FrontendMessage) -> ForemanResult<()>;

    async fn remove_item(&self, id: &str) -> ForemanResult<()>;

    async fn get(&self, id: &str) -> Option<FrontendMessage>;

    async fn list(&self) -> Vec<FrontendMessage>;
}
