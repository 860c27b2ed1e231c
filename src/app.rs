use std::sync::Arc;

use anyhow::{Context, Result};
use foreman_core::config::AppConfig;
use foreman_core::models::SessionState;
use foreman_dispatcher::{Foreman, ForemanDeps};
use foreman_infrastructure::{
    InMemoryCompletedTasks, InMemoryFrontendMessages, InMemoryLibraryStore, InMemoryPendingQueue,
    InMemoryWorkerGroupStore,
};
use foreman_worker::CommandExecutor;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 主应用程序
///
/// 用配置中的初始数据构建内存协作者，并运行Foreman调度循环。
pub struct Application {
    config: AppConfig,
    foreman: Arc<Foreman>,
    pending: Arc<InMemoryPendingQueue>,
    completed: Arc<InMemoryCompletedTasks>,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self> {
        let bootstrap = &config.bootstrap;
        info!(
            worker_groups = bootstrap.worker_groups.len(),
            libraries = bootstrap.libraries.len(),
            executor = %bootstrap.executor.program,
            "初始化应用程序"
        );

        let pending = Arc::new(InMemoryPendingQueue::new());
        let completed = Arc::new(InMemoryCompletedTasks::new());
        let session = SessionState::new(config.session.level, config.session.library_count_limit);
        let libraries = Arc::new(InMemoryLibraryStore::new(
            bootstrap.libraries.clone(),
            session,
        ));
        let groups = Arc::new(InMemoryWorkerGroupStore::new(bootstrap.worker_groups.clone()));
        let executor = Arc::new(CommandExecutor::from_config(&bootstrap.executor));

        let deps = ForemanDeps {
            pending: pending.clone(),
            completed: completed.clone(),
            messages: Arc::new(InMemoryFrontendMessages::new()),
            groups,
            libraries,
            executor,
        };
        let foreman = Arc::new(Foreman::new(config.foreman.clone(), deps));

        Ok(Self {
            config,
            foreman,
            pending,
            completed,
        })
    }

    pub fn foreman(&self) -> Arc<Foreman> {
        Arc::clone(&self.foreman)
    }

    /// 待处理任务的入口
    pub fn pending(&self) -> Arc<InMemoryPendingQueue> {
        Arc::clone(&self.pending)
    }

    pub fn completed(&self) -> Arc<InMemoryCompletedTasks> {
        Arc::clone(&self.completed)
    }

    /// 运行调度循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动Foreman");

        let foreman = self.foreman();
        let mut monitor = tokio::spawn(async move { foreman.run().await });

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("收到关闭信号，停止Foreman");
            }
            result = &mut monitor => {
                result.context("Foreman调度任务失败")?;
                warn!("Foreman调度循环在关闭前退出");
            }
        }

        self.shutdown().await;
        if !monitor.is_finished() {
            if let Err(e) = monitor.await {
                error!("Foreman调度任务失败: {}", e);
            }
        }
        Ok(())
    }

    /// 停止分发并等待Worker完成当前任务
    pub async fn shutdown(&self) {
        self.foreman.stop().await;

        let timeout = self.config.foreman.shutdown_timeout();
        if self.foreman.wait_for_workers(timeout).await {
            info!("所有Worker已退出");
        } else {
            warn!(
                "{}秒后仍有Worker在运行，停止等待",
                timeout.as_secs()
            );
        }
    }
}
