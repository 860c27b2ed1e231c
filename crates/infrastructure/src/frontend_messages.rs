use std::collections::BTreeMap;

use async_trait::async_trait;
use foreman_core::models::FrontendMessage;
use foreman_core::traits::FrontendMessages;
use foreman_core::ForemanResult;
use tokio::sync::RwLock;
use tracing::debug;

/// 内存前端消息表，以消息ID为键
#[derive(Debug, Default)]
pub struct InMemoryFrontendMessages {
    messages: RwLock<BTreeMap<String, FrontendMessage>>,
}

impl InMemoryFrontendMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.messages.read().await.contains_key(id)
    }
}

#[async_trait]
impl FrontendMessages for InMemoryFrontendMessages {
    async fn put(&self, message: FrontendMessage) -> ForemanResult<()> {
        let mut messages = self.messages.write().await;
        if !messages.contains_key(&message.id) {
            debug!(id = %message.id, "添加前端消息");
            messages.insert(message.id.clone(), message);
        }
        Ok(())
    }

    async fn update(&self, message: FrontendMessage) -> ForemanResult<()> {
        self.messages
            .write()
            .await
            .insert(message.id.clone(), message);
        Ok(())
    }

    async fn remove_item(&self, id: &str) -> ForemanResult<()> {
        if self.messages.write().await.remove(id).is_some() {
            debug!(id, "移除前端消息");
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<FrontendMessage> {
        self.messages.read().await.get(id).cloned()
    }

    async fn list(&self) -> Vec<FrontendMessage> {
        self.messages.read().await.values().cloned().collect()
    }
}
