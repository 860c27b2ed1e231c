//! 应用配置
//!
//! 配置来源按优先级从低到高：内置默认值、TOML配置文件、
//! `FOREMAN_` 前缀的环境变量（节与字段之间用 `__` 分隔，
//! 例如 `FOREMAN_FOREMAN__IDLE_WAIT_MS=5000`）。

use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::models::{Library, WorkerGroup, MAX_WORKERS_PER_GROUP};
use crate::{ForemanError, ForemanResult};

/// 配置校验接口
pub trait ConfigValidator {
    fn validate(&self) -> ForemanResult<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub foreman: ForemanConfig,
    pub observability: ObservabilityConfig,
    pub session: SessionConfig,
    pub bootstrap: BootstrapConfig,
}

/// 调度循环的等待时间和周期任务间隔
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForemanConfig {
    /// 等待空闲Worker的最长时间
    pub idle_wait_ms: u64,
    /// 等待待处理任务的最长时间
    pub task_wait_ms: u64,
    /// 配置无效或后处理队列已满时的重试间隔
    pub retry_wait_ms: u64,
    pub schedule_interval_ms: u64,
    pub prune_interval_ms: u64,
    /// 单个周期任务的执行超时
    pub job_timeout_ms: u64,
    /// 停止时等待Worker退出的最长时间
    pub shutdown_timeout_ms: u64,
    /// 每个Worker状态快照中保留的日志行数
    pub worker_log_tail_lines: usize,
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: 15_000,
            task_wait_ms: 15_000,
            retry_wait_ms: 1_000,
            schedule_interval_ms: 30_000,
            prune_interval_ms: 60_000,
            job_timeout_ms: 10_000,
            shutdown_timeout_ms: 30_000,
            worker_log_tail_lines: 20,
        }
    }
}

impl ForemanConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn task_wait(&self) -> Duration {
        Duration::from_millis(self.task_wait_ms)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_millis(self.schedule_interval_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.prune_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl ConfigValidator for ForemanConfig {
    fn validate(&self) -> ForemanResult<()> {
        let checks = [
            ("foreman.idle_wait_ms", self.idle_wait_ms),
            ("foreman.task_wait_ms", self.task_wait_ms),
            ("foreman.retry_wait_ms", self.retry_wait_ms),
            ("foreman.schedule_interval_ms", self.schedule_interval_ms),
            ("foreman.prune_interval_ms", self.prune_interval_ms),
            ("foreman.job_timeout_ms", self.job_timeout_ms),
            ("foreman.worker_log_tail_lines", self.worker_log_tail_lines as u64),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ForemanError::Configuration(format!(
                    "{field} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `pretty` 或 `json`
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "127.0.0.1:9464".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> ForemanResult<()> {
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(ForemanError::Configuration(format!(
                "observability.log_format must be 'pretty' or 'json', got '{}'",
                self.log_format
            )));
        }
        if self.log_level.trim().is_empty() {
            return Err(ForemanError::Configuration(
                "observability.log_level must not be empty".to_string(),
            ));
        }
        if self.metrics_enabled
            && self
                .metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(ForemanError::Configuration(format!(
                "observability.metrics_bind_address is not a valid socket address: {}",
                self.metrics_bind_address
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub level: u32,
    pub library_count_limit: Option<usize>,
}

/// 内存存储的初始数据和默认执行器
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootstrapConfig {
    pub worker_groups: Vec<WorkerGroup>,
    pub libraries: Vec<Library>,
    pub executor: ExecutorConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            worker_groups: vec![WorkerGroup::new("default", 1)],
            libraries: Vec::new(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl ConfigValidator for BootstrapConfig {
    fn validate(&self) -> ForemanResult<()> {
        let mut names = std::collections::HashSet::new();
        for group in &self.worker_groups {
            if group.name.trim().is_empty() {
                return Err(ForemanError::Configuration(
                    "worker group name must not be empty".to_string(),
                ));
            }
            if !names.insert(group.name.as_str()) {
                return Err(ForemanError::Configuration(format!(
                    "duplicate worker group name: {}",
                    group.name
                )));
            }
            if group.number_of_workers > MAX_WORKERS_PER_GROUP {
                return Err(ForemanError::InvalidWorkerCount {
                    count: group.number_of_workers,
                    max: MAX_WORKERS_PER_GROUP,
                });
            }
            for schedule in &group.event_schedules {
                schedule.parse_time()?;
            }
        }
        self.executor.validate()
    }
}

/// 外部命令执行器配置，参数中的 `{abspath}` 会替换为任务文件路径
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "echo".to_string(),
            args: vec!["{abspath}".to_string()],
        }
    }
}

impl ConfigValidator for ExecutorConfig {
    fn validate(&self) -> ForemanResult<()> {
        if self.program.trim().is_empty() {
            return Err(ForemanError::Configuration(
                "bootstrap.executor.program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> ForemanResult<Self> {
        let defaults = ForemanConfig::default();
        let observability = ObservabilityConfig::default();

        let mut builder = ConfigBuilder::builder()
            .set_default("foreman.idle_wait_ms", defaults.idle_wait_ms)?
            .set_default("foreman.task_wait_ms", defaults.task_wait_ms)?
            .set_default("foreman.retry_wait_ms", defaults.retry_wait_ms)?
            .set_default("foreman.schedule_interval_ms", defaults.schedule_interval_ms)?
            .set_default("foreman.prune_interval_ms", defaults.prune_interval_ms)?
            .set_default("foreman.job_timeout_ms", defaults.job_timeout_ms)?
            .set_default("foreman.shutdown_timeout_ms", defaults.shutdown_timeout_ms)?
            .set_default(
                "foreman.worker_log_tail_lines",
                defaults.worker_log_tail_lines as u64,
            )?
            .set_default("observability.log_level", observability.log_level)?
            .set_default("observability.log_format", observability.log_format)?
            .set_default("observability.metrics_enabled", observability.metrics_enabled)?
            .set_default(
                "observability.metrics_bind_address",
                observability.metrics_bind_address,
            )?;

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(ForemanError::Configuration(format!(
                    "config file not found: {path}"
                )));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/foreman.toml", "foreman.toml", "/etc/foreman/foreman.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FOREMAN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> ForemanResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)
            .map_err(|e| ForemanError::Configuration(format!("failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ForemanResult<()> {
        self.foreman.validate()?;
        self.observability.validate()?;
        self.bootstrap.validate()?;
        Ok(())
    }
}
