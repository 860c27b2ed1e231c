use async_trait::async_trait;

use crate::models::{EnabledPlugin, EventSchedule, PluginFlow, WorkerGroup};
use crate::{ForemanError, ForemanResult};

/// Worker组存储
///
/// Foreman只读取Worker组，唯一的写操作是定时事件修改Worker数量。
#[async_trait]
pub trait WorkerGroupStore: Send + Sync {
    async fn get_all_worker_groups(&self) -> ForemanResult<Vec<WorkerGroup>>;

    async fn get(&self, id: i64) -> ForemanResult<Option<WorkerGroup>>;

    /// 保存Worker组，首次保存时分配ID并返回
    async fn save(&self, group: WorkerGroup) -> ForemanResult<WorkerGroup>;

    async fn set_number_of_workers(&self, id: i64, count: usize) -> ForemanResult<()> {
        let mut group = self
            .get(id)
            .await?
            .ok_or(ForemanError::WorkerGroupNotFound { id })?;
        group.set_number_of_workers(count)?;
        self.save(group).await?;
        Ok(())
    }

    async fn get_tags(&self, id: i64) -> ForemanResult<Vec<String>> {
        Ok(self.get(id).await?.map(|g| g.tags).unwrap_or_default())
    }

    async fn get_worker_event_schedules(&self, id: i64) -> ForemanResult<Vec<EventSchedule>> {
        Ok(self
            .get(id)
            .await?
            .map(|g| g.event_schedules)
            .unwrap_or_default())
    }
}

/// 媒体库插件配置存储
#[async_trait]
pub trait LibraryConfigStore: Send + Sync {
    async fn list_library_ids(&self) -> ForemanResult<Vec<i64>>;

    async fn enabled_plugins(&self, library_id: i64) -> ForemanResult<Vec<EnabledPlugin>>;

    async fn plugin_flow(&self, library_id: i64) -> ForemanResult<PluginFlow>;

    /// 已启用但与当前插件处理器不兼容的插件ID
    async fn incompatible_enabled_plugins(&self) -> ForemanResult<Vec<String>>;

    async fn within_library_count_limits(&self) -> ForemanResult<bool>;
}
