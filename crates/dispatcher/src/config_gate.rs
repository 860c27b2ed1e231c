//! 配置变更闸门
//!
//! 每轮调度前重新计算所有媒体库的插件配置快照。快照哈希与上次确认的
//! 不同时，记录新的快照并让本轮检查失败，防止Worker在用户修改配置
//! 的中途认领任务。插件兼容性和媒体库数量限制也在这里一起检查。

use foreman_core::models::{
    FrontendMessage, LibraryPluginConfig, LibrarySettings, INCOMPATIBLE_PLUGINS_ENABLED,
    LIBRARY_COUNT_LIMIT_EXCEEDED, PLUGIN_SETTINGS_CHANGED,
};
use foreman_core::traits::{FrontendMessages, LibraryConfigStore};
use foreman_core::ForemanResult;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// 插件配置快照
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub settings: LibrarySettings,
    pub settings_hash: String,
}

impl ConfigSnapshot {
    pub fn new(settings: LibrarySettings) -> ForemanResult<Self> {
        let settings_hash = settings_hash(&settings)?;
        Ok(Self {
            settings,
            settings_hash,
        })
    }
}

/// 规范化序列化后的SHA-256
///
/// 媒体库按ID排序，插件设置中的对象键也是有序的，因此相同内容总是得到相同的哈希。
pub fn settings_hash(settings: &LibrarySettings) -> ForemanResult<String> {
    let encoded = serde_json::to_vec(settings)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

/// 一轮检查的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateReport {
    pub settings_changed: bool,
    pub incompatible_plugins: Vec<String>,
    pub library_limit_exceeded: bool,
    /// 读取配置失败
    pub unavailable: bool,
}

impl GateReport {
    pub fn is_valid(&self) -> bool {
        !self.settings_changed
            && self.incompatible_plugins.is_empty()
            && !self.library_limit_exceeded
            && !self.unavailable
    }
}

#[derive(Debug, Default)]
pub struct ConfigGate {
    current: Option<ConfigSnapshot>,
}

impl ConfigGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取所有媒体库的插件配置，单个媒体库读取失败时跳过
    pub async fn collect_settings(
        libraries: &dyn LibraryConfigStore,
    ) -> ForemanResult<LibrarySettings> {
        let mut settings = LibrarySettings::new();
        for library_id in libraries.list_library_ids().await? {
            let enabled_plugins = match libraries.enabled_plugins(library_id).await {
                Ok(plugins) => plugins,
                Err(e) => {
                    warn!(library_id, "无法获取媒体库配置: {}", e);
                    continue;
                }
            };
            let plugin_flow = match libraries.plugin_flow(library_id).await {
                Ok(flow) => flow,
                Err(e) => {
                    warn!(library_id, "无法获取媒体库插件流程: {}", e);
                    continue;
                }
            };
            settings.insert(
                library_id,
                LibraryPluginConfig {
                    enabled_plugins,
                    plugin_flow,
                },
            );
        }
        Ok(settings)
    }

    /// 与确认快照比较。第一次调用只记录快照；哈希不同时记录新快照并返回 true
    pub fn configuration_changed(&mut self, settings: LibrarySettings) -> ForemanResult<bool> {
        let snapshot = ConfigSnapshot::new(settings)?;
        match &self.current {
            Some(current) if current.settings_hash == snapshot.settings_hash => Ok(false),
            Some(_) => {
                debug!(
                    settings_hash = %snapshot.settings_hash,
                    "配置已更新，配置变化时所有Worker将被暂停"
                );
                self.current = Some(snapshot);
                Ok(true)
            }
            None => {
                self.current = Some(snapshot);
                Ok(false)
            }
        }
    }

    /// 完整的一轮检查，并维护对应的前端消息
    pub async fn validate(
        &mut self,
        libraries: &dyn LibraryConfigStore,
        messages: &dyn FrontendMessages,
    ) -> GateReport {
        let mut report = GateReport::default();

        match libraries.incompatible_enabled_plugins().await {
            Ok(plugins) => report.incompatible_plugins = plugins,
            Err(e) => {
                warn!("无法检查插件兼容性: {}", e);
                report.unavailable = true;
            }
        }
        let result = if report.incompatible_plugins.is_empty() {
            messages.remove_item(INCOMPATIBLE_PLUGINS_ENABLED).await
        } else {
            warn!(plugins = ?report.incompatible_plugins, "启用了不兼容的插件");
            messages
                .update(
                    FrontendMessage::warning(INCOMPATIBLE_PLUGINS_ENABLED)
                        .with_message(report.incompatible_plugins.join(", ")),
                )
                .await
        };
        log_message_error(result);

        let changed = match Self::collect_settings(libraries).await {
            Ok(settings) => self.configuration_changed(settings),
            Err(e) => Err(e),
        };
        match changed {
            Ok(true) => {
                report.settings_changed = true;
                warn!("插件配置已变化，暂停所有Worker");
                log_message_error(
                    messages
                        .put(FrontendMessage::warning(PLUGIN_SETTINGS_CHANGED))
                        .await,
                );
            }
            Ok(false) => {}
            Err(e) => {
                warn!("无法读取插件配置: {}", e);
                report.unavailable = true;
            }
        }

        match libraries.within_library_count_limits().await {
            Ok(true) => log_message_error(messages.remove_item(LIBRARY_COUNT_LIMIT_EXCEEDED).await),
            Ok(false) => {
                report.library_limit_exceeded = true;
                warn!("媒体库数量超出当前安装的限制");
                log_message_error(
                    messages
                        .put(FrontendMessage::warning(LIBRARY_COUNT_LIMIT_EXCEEDED))
                        .await,
                );
            }
            Err(e) => {
                warn!("无法检查媒体库数量限制: {}", e);
                report.unavailable = true;
            }
        }

        if !report.is_valid() {
            metrics::counter!("foreman_config_gate_failures_total").increment(1);
        }
        report
    }
}

fn log_message_error(result: ForemanResult<()>) {
    if let Err(e) = result {
        warn!("更新前端消息失败: {}", e);
    }
}
