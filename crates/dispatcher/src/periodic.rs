use std::time::{Duration, Instant};

/// 调度循环内执行的周期任务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicJobKind {
    ManageEventSchedules,
    PruneDeadWorkers,
}

impl std::fmt::Display for PeriodicJobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ManageEventSchedules => "manage_event_schedules",
            Self::PruneDeadWorkers => "prune_dead_workers",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct PeriodicJob {
    pub kind: PeriodicJobKind,
    pub interval: Duration,
    pub timeout: Duration,
    last_run: Instant,
}

/// 周期任务表
///
/// 每个任务在注册后经过一个间隔才第一次到期，到期后从取出的时刻重新计时。
#[derive(Debug, Default)]
pub struct PeriodicJobs {
    jobs: Vec<PeriodicJob>,
}

impl PeriodicJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        kind: PeriodicJobKind,
        interval: Duration,
        timeout: Duration,
        now: Instant,
    ) {
        self.jobs.push(PeriodicJob {
            kind,
            interval,
            timeout,
            last_run: now,
        });
    }

    /// 取出所有到期的任务并记录本次运行时间
    pub fn take_due(&mut self, now: Instant) -> Vec<PeriodicJob> {
        let mut due = Vec::new();
        for job in &mut self.jobs {
            if now.saturating_duration_since(job.last_run) >= job.interval {
                job.last_run = now;
                due.push(job.clone());
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_become_due_after_their_interval() {
        let start = Instant::now();
        let mut jobs = PeriodicJobs::new();
        jobs.register(
            PeriodicJobKind::ManageEventSchedules,
            Duration::from_secs(30),
            Duration::from_secs(5),
            start,
        );
        jobs.register(
            PeriodicJobKind::PruneDeadWorkers,
            Duration::from_secs(60),
            Duration::from_secs(5),
            start,
        );

        assert!(jobs.take_due(start).is_empty());

        let due = jobs.take_due(start + Duration::from_secs(30));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, PeriodicJobKind::ManageEventSchedules);

        let due = jobs.take_due(start + Duration::from_secs(45));
        assert!(due.is_empty());

        let kinds: Vec<_> = jobs
            .take_due(start + Duration::from_secs(60))
            .into_iter()
            .map(|job| job.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                PeriodicJobKind::ManageEventSchedules,
                PeriodicJobKind::PruneDeadWorkers
            ]
        );
    }
}
