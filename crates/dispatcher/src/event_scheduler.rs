//! Worker组定时事件的评估
//!
//! 每个定时事件转换为CRON表达式，在 (上次检查时间, 当前时间] 窗口内
//! 有触发点时执行一次。窗口首尾相接，所以同一个匹配分钟最多触发一次。
//! 时间使用本地挂钟时间（不带时区），按UTC参与CRON计算，避免
//! 夏令时切换时重复或遗漏计算。
//! 两次检查间隔超过 `max_gap` 时（进程挂起、系统休眠），错过的事件不再补发，
//! 窗口从当前分钟开始。

use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use cron::Schedule;
use foreman_core::models::{EventSchedule, ScheduleTask, WorkerGroup};
use foreman_core::{ForemanError, ForemanResult};
use tracing::{debug, warn};

/// 到期需要执行的定时动作
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledAction {
    pub worker_group_id: i64,
    pub worker_group_name: String,
    pub task: ScheduleTask,
    pub worker_count: Option<usize>,
}

/// 默认的最大检查间隔：一个30秒检查周期加一分钟
pub const DEFAULT_MAX_GAP_SECS: i64 = 90;

#[derive(Debug)]
pub struct EventScheduler {
    last_checked: NaiveDateTime,
    max_gap: Duration,
}

impl EventScheduler {
    /// 从当前分钟开始时检查，启动所在分钟匹配的事件也会触发
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            last_checked: start_of_minute(now) - Duration::seconds(1),
            max_gap: Duration::seconds(DEFAULT_MAX_GAP_SECS),
        }
    }

    pub fn with_max_gap(mut self, max_gap: Duration) -> Self {
        self.max_gap = max_gap;
        self
    }

    pub fn last_checked(&self) -> NaiveDateTime {
        self.last_checked
    }

    pub fn reset(&mut self, last_checked: NaiveDateTime) {
        self.last_checked = last_checked;
    }

    /// 计算本次检查窗口内到期的动作，并把窗口推进到 `now`
    pub fn due_actions(&mut self, groups: &[WorkerGroup], now: NaiveDateTime) -> Vec<ScheduledAction> {
        let mut after = self.last_checked;
        if now <= after {
            return Vec::new();
        }
        if now - after > self.max_gap {
            debug!(last_checked = %after, now = %now, "定时事件检查间隔过长，跳过错过的事件");
            after = start_of_minute(now) - Duration::seconds(1);
        }

        let mut actions = Vec::new();
        for group in groups {
            let Some(worker_group_id) = group.id else {
                continue;
            };
            for schedule in &group.event_schedules {
                match fires_between(schedule, after, now) {
                    Ok(true) => {
                        debug!(
                            worker_group = %group.name,
                            task = %schedule.schedule_task,
                            time = %schedule.schedule_time,
                            "定时事件到期"
                        );
                        actions.push(ScheduledAction {
                            worker_group_id,
                            worker_group_name: group.name.clone(),
                            task: schedule.schedule_task,
                            worker_count: schedule.schedule_worker_count,
                        });
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(worker_group = %group.name, "跳过定时事件: {}", e);
                    }
                }
            }
        }

        self.last_checked = now;
        actions
    }
}

fn start_of_minute(time: NaiveDateTime) -> NaiveDateTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// 定时事件在 (after, now] 内是否有触发点
pub fn fires_between(
    schedule: &EventSchedule,
    after: NaiveDateTime,
    now: NaiveDateTime,
) -> ForemanResult<bool> {
    let expression = schedule.to_cron_expression()?;
    let cron = Schedule::from_str(&expression).map_err(|e| ForemanError::InvalidSchedule {
        schedule: expression.clone(),
        message: e.to_string(),
    })?;

    let after = Utc.from_utc_datetime(&after);
    let now = Utc.from_utc_datetime(&now);
    Ok(cron.after(&after).next().is_some_and(|next| next <= now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use foreman_core::models::Repetition;

    fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .unwrap()
    }

    fn group(schedule: EventSchedule) -> WorkerGroup {
        WorkerGroup::new("default", 2).with_id(1).with_schedule(schedule)
    }

    #[test]
    fn test_fires_once_across_thirty_second_ticks() {
        let groups = vec![group(EventSchedule::new(
            "09:00",
            Repetition::Daily,
            ScheduleTask::Pause,
        ))];
        let mut scheduler = EventScheduler::new(at(14, 8, 59, 0));

        let mut fired = 0;
        for tick in 0..6 {
            let now = at(14, 8, 59, 0) + Duration::seconds(30 * tick);
            fired += scheduler.due_actions(&groups, now).len();
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_startup_inside_matching_minute_fires() {
        let groups = vec![group(EventSchedule::new(
            "09:00",
            Repetition::Daily,
            ScheduleTask::Resume,
        ))];
        let mut scheduler = EventScheduler::new(at(14, 9, 0, 40));
        let actions = scheduler.due_actions(&groups, at(14, 9, 0, 50));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].task, ScheduleTask::Resume);
    }

    #[test]
    fn test_repetition_filters_days() {
        let weekday = group(EventSchedule::new(
            "09:00",
            Repetition::Weekday,
            ScheduleTask::Pause,
        ));
        let weekend = group(EventSchedule::new(
            "09:00",
            Repetition::Weekend,
            ScheduleTask::Pause,
        ));

        // 2026-10-14 是星期三，2026-10-17 是星期六
        assert!(fires_between(&weekday.event_schedules[0], at(14, 8, 59, 30), at(14, 9, 0, 0)).unwrap());
        assert!(!fires_between(&weekend.event_schedules[0], at(14, 8, 59, 30), at(14, 9, 0, 0)).unwrap());
        assert!(!fires_between(&weekday.event_schedules[0], at(17, 8, 59, 30), at(17, 9, 0, 0)).unwrap());
        assert!(fires_between(&weekend.event_schedules[0], at(17, 8, 59, 30), at(17, 9, 0, 0)).unwrap());

        let wednesday = EventSchedule::new("09:00", Repetition::Wednesday, ScheduleTask::Pause);
        assert!(fires_between(&wednesday, at(14, 8, 59, 30), at(14, 9, 0, 0)).unwrap());
        assert!(!fires_between(&wednesday, at(15, 8, 59, 30), at(15, 9, 0, 0)).unwrap());
    }

    #[test]
    fn test_clock_moving_backwards_does_not_refire() {
        let groups = vec![group(EventSchedule::new(
            "09:00",
            Repetition::Daily,
            ScheduleTask::Pause,
        ))];
        let mut scheduler = EventScheduler::new(at(14, 8, 59, 0));
        assert_eq!(scheduler.due_actions(&groups, at(14, 9, 0, 10)).len(), 1);
        assert!(scheduler.due_actions(&groups, at(14, 8, 59, 50)).is_empty());
        assert!(scheduler.due_actions(&groups, at(14, 9, 0, 20)).is_empty());
    }

    #[test]
    fn test_invalid_schedule_and_unsaved_group_are_skipped() {
        let mut bad = group(EventSchedule::new("25:00", Repetition::Daily, ScheduleTask::Pause));
        bad.event_schedules
            .push(EventSchedule::new("09:00", Repetition::Daily, ScheduleTask::Count).with_worker_count(3));
        let unsaved = WorkerGroup::new("new", 1)
            .with_schedule(EventSchedule::new("09:00", Repetition::Daily, ScheduleTask::Pause));

        let mut scheduler = EventScheduler::new(at(14, 8, 59, 0));
        let actions = scheduler.due_actions(&[bad, unsaved], at(14, 9, 0, 0));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].task, ScheduleTask::Count);
        assert_eq!(actions[0].worker_count, Some(3));
    }

    #[test]
    fn test_long_gap_skips_missed_events() {
        let groups = vec![WorkerGroup::new("default", 2)
            .with_id(1)
            .with_schedule(EventSchedule::new("17:00", Repetition::Daily, ScheduleTask::Resume))
            .with_schedule(EventSchedule::new("09:00", Repetition::Daily, ScheduleTask::Pause))];
        let mut scheduler = EventScheduler::new(at(14, 8, 0, 0));

        assert!(scheduler.due_actions(&groups, at(14, 18, 0, 0)).is_empty());
        assert_eq!(scheduler.last_checked(), at(14, 18, 0, 0));
    }

    #[test]
    fn test_long_gap_still_fires_current_minute() {
        let groups = vec![group(EventSchedule::new(
            "18:00",
            Repetition::Daily,
            ScheduleTask::Resume,
        ))];
        let mut scheduler = EventScheduler::new(at(14, 8, 0, 0));

        let actions = scheduler.due_actions(&groups, at(14, 18, 0, 20));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].task, ScheduleTask::Resume);
        assert!(scheduler.due_actions(&groups, at(14, 18, 0, 50)).is_empty());
    }

    #[test]
    fn test_max_gap_follows_check_interval() {
        let groups = vec![group(EventSchedule::new(
            "09:00",
            Repetition::Daily,
            ScheduleTask::Pause,
        ))];
        let mut scheduler = EventScheduler::new(at(14, 8, 55, 0)).with_max_gap(Duration::minutes(10));
        assert_eq!(scheduler.due_actions(&groups, at(14, 9, 4, 0)).len(), 1);
    }
}
