use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use cronmaster_core::{SchedulerError, SchedulerResult};

/// CRON表达式的触发点规划
pub struct CronPlanner {
    schedule: Schedule,
}

impl CronPlanner {
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { schedule })
    }

    /// (after, until] 区间内的全部触发点，升序
    pub fn occurrences_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&after)
            .take_while(|time| *time <= until)
            .collect()
    }

    /// (after, until] 区间内最后一个触发点，用于补偿漏掉的触发
    pub fn latest_between(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.occurrences_between(after, until).into_iter().last()
    }

    pub fn next_occurrence(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}
