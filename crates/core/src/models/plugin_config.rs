use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 媒体库中启用的插件及其设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnabledPlugin {
    pub plugin_id: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl EnabledPlugin {
    pub fn new(plugin_id: impl Into<String>, settings: serde_json::Value) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            settings,
        }
    }
}

/// 插件执行流程：运行器类型 -> 按顺序执行的插件ID
pub type PluginFlow = BTreeMap<String, Vec<String>>;

/// 单个媒体库的插件配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LibraryPluginConfig {
    pub enabled_plugins: Vec<EnabledPlugin>,
    pub plugin_flow: PluginFlow,
}

/// 所有媒体库的插件配置，按媒体库ID排序
pub type LibrarySettings = BTreeMap<i64, LibraryPluginConfig>;

/// 媒体库定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub enabled_plugins: Vec<EnabledPlugin>,
    #[serde(default)]
    pub plugin_flow: PluginFlow,
}

impl Library {
    pub fn new(id: i64, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            path: path.into(),
            tags: Vec::new(),
            enabled_plugins: Vec::new(),
            plugin_flow: PluginFlow::new(),
        }
    }

    pub fn with_plugin(mut self, plugin: EnabledPlugin) -> Self {
        self.enabled_plugins.push(plugin);
        self
    }

    pub fn plugin_config(&self) -> LibraryPluginConfig {
        LibraryPluginConfig {
            enabled_plugins: self.enabled_plugins.clone(),
            plugin_flow: self.plugin_flow.clone(),
        }
    }
}
