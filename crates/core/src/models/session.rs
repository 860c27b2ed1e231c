use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 安装会话状态
///
/// 由应用启动时显式创建并传递给需要它的组件，不使用全局单例。
/// 远程授权客户端不在本系统范围内，这里只保留编排器需要的字段。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub installation_uuid: Uuid,
    pub level: u32,
    /// 允许的最大媒体库数量，None表示不限制
    pub library_count_limit: Option<usize>,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(level: u32, library_count_limit: Option<usize>) -> Self {
        Self {
            installation_uuid: Uuid::new_v4(),
            level,
            library_count_limit,
            created_at: Utc::now(),
        }
    }

    pub fn with_installation_uuid(mut self, uuid: Uuid) -> Self {
        self.installation_uuid = uuid;
        self
    }

    pub fn within_library_count_limit(&self, library_count: usize) -> bool {
        match self.library_count_limit {
            Some(limit) => library_count <= limit,
            None => true,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(0, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_limit() {
        let session = SessionState::new(0, Some(2));
        assert!(session.within_library_count_limit(2));
        assert!(!session.within_library_count_limit(3));

        let unlimited = SessionState::default();
        assert!(unlimited.within_library_count_limit(1000));
    }
}
