use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use foreman_core::models::{EnabledPlugin, Library, PluginFlow, SessionState, WorkerGroup};
use foreman_core::traits::{LibraryConfigStore, WorkerGroupStore};
use foreman_core::{ForemanError, ForemanResult};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 内存Worker组存储
#[derive(Debug)]
pub struct InMemoryWorkerGroupStore {
    groups: RwLock<BTreeMap<i64, WorkerGroup>>,
    next_id: AtomicI64,
}

impl InMemoryWorkerGroupStore {
    /// 用初始Worker组创建存储，没有ID的组按顺序分配ID
    pub fn new(groups: Vec<WorkerGroup>) -> Self {
        let mut next_id = groups.iter().filter_map(|g| g.id).max().unwrap_or(0) + 1;
        let mut map = BTreeMap::new();
        for mut group in groups {
            let id = match group.id {
                Some(id) => id,
                None => {
                    let id = next_id;
                    next_id += 1;
                    group.id = Some(id);
                    id
                }
            };
            map.insert(id, group);
        }
        Self {
            groups: RwLock::new(map),
            next_id: AtomicI64::new(next_id),
        }
    }

    pub async fn delete(&self, id: i64) -> ForemanResult<()> {
        let mut groups = self.groups.write().await;
        match groups.get(&id) {
            None => Err(ForemanError::WorkerGroupNotFound { id }),
            Some(group) if group.locked => Err(ForemanError::Store(format!(
                "worker group {} is locked",
                group.name
            ))),
            Some(_) => {
                groups.remove(&id);
                info!(worker_group_id = id, "Worker组已删除");
                Ok(())
            }
        }
    }
}

impl Default for InMemoryWorkerGroupStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl WorkerGroupStore for InMemoryWorkerGroupStore {
    async fn get_all_worker_groups(&self) -> ForemanResult<Vec<WorkerGroup>> {
        Ok(self.groups.read().await.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> ForemanResult<Option<WorkerGroup>> {
        Ok(self.groups.read().await.get(&id).cloned())
    }

    async fn save(&self, mut group: WorkerGroup) -> ForemanResult<WorkerGroup> {
        let mut groups = self.groups.write().await;
        let duplicate = groups
            .values()
            .any(|existing| existing.name == group.name && existing.id != group.id);
        if duplicate {
            return Err(ForemanError::Store(format!(
                "worker group name already exists: {}",
                group.name
            )));
        }

        let id = match group.id {
            Some(id) => id,
            None => self.next_id.fetch_add(1, Ordering::SeqCst),
        };
        group.id = Some(id);
        debug!(worker_group_id = id, name = %group.name, "Worker组已保存");
        groups.insert(id, group.clone());
        Ok(group)
    }
}

/// 内存媒体库配置存储
///
/// 媒体库数量限制由显式传入的 [`SessionState`] 决定。
#[derive(Debug)]
pub struct InMemoryLibraryStore {
    libraries: RwLock<BTreeMap<i64, Library>>,
    incompatible_plugins: RwLock<Vec<String>>,
    session: SessionState,
}

impl InMemoryLibraryStore {
    pub fn new(libraries: Vec<Library>, session: SessionState) -> Self {
        Self {
            libraries: RwLock::new(libraries.into_iter().map(|l| (l.id, l)).collect()),
            incompatible_plugins: RwLock::new(Vec::new()),
            session,
        }
    }

    pub async fn add_library(&self, library: Library) {
        self.libraries.write().await.insert(library.id, library);
    }

    pub async fn remove_library(&self, id: i64) -> bool {
        self.libraries.write().await.remove(&id).is_some()
    }

    /// 修改一个已启用插件的设置，插件未启用时启用它
    pub async fn set_plugin_settings(
        &self,
        library_id: i64,
        plugin_id: &str,
        settings: serde_json::Value,
    ) -> ForemanResult<()> {
        let mut libraries = self.libraries.write().await;
        let library = libraries
            .get_mut(&library_id)
            .ok_or_else(|| ForemanError::Store(format!("library not found: {library_id}")))?;

        match library
            .enabled_plugins
            .iter_mut()
            .find(|p| p.plugin_id == plugin_id)
        {
            Some(plugin) => plugin.settings = settings,
            None => library
                .enabled_plugins
                .push(EnabledPlugin::new(plugin_id, settings)),
        }
        Ok(())
    }

    pub async fn set_plugin_flow(&self, library_id: i64, flow: PluginFlow) -> ForemanResult<()> {
        let mut libraries = self.libraries.write().await;
        let library = libraries
            .get_mut(&library_id)
            .ok_or_else(|| ForemanError::Store(format!("library not found: {library_id}")))?;
        library.plugin_flow = flow;
        Ok(())
    }

    pub async fn set_incompatible_plugins(&self, plugin_ids: Vec<String>) {
        *self.incompatible_plugins.write().await = plugin_ids;
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    async fn library(&self, library_id: i64) -> ForemanResult<Library> {
        self.libraries
            .read()
            .await
            .get(&library_id)
            .cloned()
            .ok_or_else(|| ForemanError::Store(format!("library not found: {library_id}")))
    }
}

#[async_trait]
impl LibraryConfigStore for InMemoryLibraryStore {
    async fn list_library_ids(&self) -> ForemanResult<Vec<i64>> {
        Ok(self.libraries.read().await.keys().copied().collect())
    }

    async fn enabled_plugins(&self, library_id: i64) -> ForemanResult<Vec<EnabledPlugin>> {
        Ok(self.library(library_id).await?.enabled_plugins)
    }

    async fn plugin_flow(&self, library_id: i64) -> ForemanResult<PluginFlow> {
        Ok(self.library(library_id).await?.plugin_flow)
    }

    async fn incompatible_enabled_plugins(&self) -> ForemanResult<Vec<String>> {
        let incompatible = self.incompatible_plugins.read().await;
        let libraries = self.libraries.read().await;
        let mut enabled: Vec<String> = libraries
            .values()
            .flat_map(|l| l.enabled_plugins.iter())
            .filter(|p| incompatible.contains(&p.plugin_id))
            .map(|p| p.plugin_id.clone())
            .collect();
        enabled.sort();
        enabled.dedup();
        Ok(enabled)
    }

    async fn within_library_count_limits(&self) -> ForemanResult<bool> {
        let count = self.libraries.read().await.len();
        Ok(self.session.within_library_count_limit(count))
    }
}
