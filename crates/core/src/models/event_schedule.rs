use serde::{Deserialize, Serialize};

use crate::{ForemanError, ForemanResult};

/// 定时事件的重复规则
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Repetition {
    Daily,
    Weekday,
    Weekend,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Repetition {
    /// CRON表达式中的星期字段
    pub fn cron_day_of_week(&self) -> &'static str {
        match self {
            Repetition::Daily => "*",
            Repetition::Weekday => "Mon,Tue,Wed,Thu,Fri",
            Repetition::Weekend => "Sat,Sun",
            Repetition::Monday => "Mon",
            Repetition::Tuesday => "Tue",
            Repetition::Wednesday => "Wed",
            Repetition::Thursday => "Thu",
            Repetition::Friday => "Fri",
            Repetition::Saturday => "Sat",
            Repetition::Sunday => "Sun",
        }
    }
}

/// 定时事件要执行的动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleTask {
    Pause,
    Resume,
    Count,
}

impl std::fmt::Display for ScheduleTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleTask::Pause => "pause",
            ScheduleTask::Resume => "resume",
            ScheduleTask::Count => "count",
        };
        write!(f, "{s}")
    }
}

/// Worker组的定时事件
///
/// `schedule_time` 为 "HH:MM" 格式的挂钟时间，分钟精度。
/// `schedule_worker_count` 仅在 `schedule_task` 为 `count` 时使用。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSchedule {
    pub repetition: Repetition,
    pub schedule_task: ScheduleTask,
    pub schedule_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_worker_count: Option<usize>,
}

impl EventSchedule {
    pub fn new(
        schedule_time: impl Into<String>,
        repetition: Repetition,
        schedule_task: ScheduleTask,
    ) -> Self {
        Self {
            repetition,
            schedule_task,
            schedule_time: schedule_time.into(),
            schedule_worker_count: None,
        }
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.schedule_worker_count = Some(count);
        self
    }

    /// 解析 "HH:MM"，返回 (小时, 分钟)
    pub fn parse_time(&self) -> ForemanResult<(u32, u32)> {
        let invalid = |message: &str| ForemanError::InvalidSchedule {
            schedule: self.schedule_time.clone(),
            message: message.to_string(),
        };

        let (hour, minute) = self
            .schedule_time
            .trim()
            .split_once(':')
            .ok_or_else(|| invalid("expected HH:MM"))?;
        let hour: u32 = hour.parse().map_err(|_| invalid("hour is not a number"))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| invalid("minute is not a number"))?;

        if hour > 23 {
            return Err(invalid("hour out of range"));
        }
        if minute > 59 {
            return Err(invalid("minute out of range"));
        }
        Ok((hour, minute))
    }

    /// 转换为6字段CRON表达式（秒 分 时 日 月 星期）
    pub fn to_cron_expression(&self) -> ForemanResult<String> {
        let (hour, minute) = self.parse_time()?;
        Ok(format!(
            "0 {minute} {hour} * * {}",
            self.repetition.cron_day_of_week()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_expression_for_each_repetition() {
        let schedule = EventSchedule::new("09:05", Repetition::Daily, ScheduleTask::Pause);
        assert_eq!(schedule.to_cron_expression().unwrap(), "0 5 9 * * *");

        let schedule = EventSchedule::new("23:59", Repetition::Weekday, ScheduleTask::Resume);
        assert_eq!(schedule.to_cron_expression().unwrap(), "0 59 23 * * Mon,Tue,Wed,Thu,Fri");

        let schedule = EventSchedule::new("00:00", Repetition::Weekend, ScheduleTask::Pause);
        assert_eq!(schedule.to_cron_expression().unwrap(), "0 0 0 * * Sat,Sun");

        let schedule = EventSchedule::new("12:30", Repetition::Thursday, ScheduleTask::Count)
            .with_worker_count(3);
        assert_eq!(schedule.to_cron_expression().unwrap(), "0 30 12 * * Thu");
    }

    #[test]
    fn test_invalid_times_are_rejected() {
        for bad in ["", "9", "24:00", "12:60", "aa:10", "10:bb"] {
            let schedule = EventSchedule::new(bad, Repetition::Daily, ScheduleTask::Pause);
            assert!(schedule.parse_time().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_deserialize_from_settings_json() {
        let json = serde_json::json!({
            "repetition": "weekend",
            "schedule_task": "count",
            "schedule_time": "18:00",
            "schedule_worker_count": 4
        });
        let schedule: EventSchedule = serde_json::from_value(json).unwrap();
        assert_eq!(schedule.repetition, Repetition::Weekend);
        assert_eq!(schedule.schedule_task, ScheduleTask::Count);
        assert_eq!(schedule.schedule_worker_count, Some(4));
    }
}
