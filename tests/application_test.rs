use std::time::Duration;

use anyhow::Result;
use foreman::app::Application;
use foreman::shutdown::ShutdownManager;
use foreman_core::config::AppConfig;
use foreman_core::models::{Repetition, ScheduleTask, Task};

#[test]
fn test_sample_config_loads() -> Result<()> {
    let config = AppConfig::load(Some("config/foreman.toml"))?;

    assert_eq!(config.bootstrap.worker_groups.len(), 2);
    let gpu = &config.bootstrap.worker_groups[1];
    assert_eq!(gpu.tags, vec!["gpu".to_string()]);
    assert_eq!(gpu.event_schedules[0].repetition, Repetition::Weekend);
    assert_eq!(gpu.event_schedules[0].schedule_task, ScheduleTask::Pause);
    assert_eq!(config.bootstrap.libraries[0].enabled_plugins.len(), 1);
    assert_eq!(config.bootstrap.executor.program, "echo");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_application_processes_tasks_and_shuts_down() -> Result<()> {
    let mut config = AppConfig::default();
    config.foreman.idle_wait_ms = 50;
    config.foreman.task_wait_ms = 50;
    config.foreman.shutdown_timeout_ms = 2_000;

    let app = std::sync::Arc::new(Application::new(config)?);
    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;

    let runner = std::sync::Arc::clone(&app);
    let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

    app.pending()
        .push(Task::new(1, "/library/movies/a.mkv"))
        .await?;

    let completed = app.completed();
    let mut processed = None;
    for _ in 0..200 {
        if let Some(next) = completed.take_next().await {
            processed = Some(next);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let processed = processed.expect("task was not processed");
    assert!(processed.result.success);
    assert_eq!(processed.result.output.as_deref(), Some("/library/movies/a.mkv"));

    shutdown_manager.shutdown().await;
    tokio::time::timeout(Duration::from_secs(5), handle).await???;
    assert!(app.foreman().get_all_worker_status().is_empty());
    Ok(())
}
