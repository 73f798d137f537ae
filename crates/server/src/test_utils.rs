//! 单测共享的mock实现与数据构造器

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use cronmaster_core::{SchedulerError, SchedulerResult};
use cronmaster_domain::entities::{
    JobCron, PrevTaskStatus, TaskBaseContext, TaskRecord, TaskWaiting,
};
use cronmaster_domain::repositories::ScheduleRepository;

/// 一次事务性落库的记录
#[derive(Debug, Clone)]
pub struct GeneratedBatch {
    pub job_key: String,
    pub task_keys: Vec<String>,
    pub trigger_times: Vec<DateTime<Utc>>,
    pub watermark: DateTime<Utc>,
}

/// 可编排行为、记录调用的存储层mock
#[derive(Default)]
pub struct MockScheduleRepository {
    pub cron_jobs: Mutex<Vec<JobCron>>,
    pub waiting_tasks: Mutex<Vec<TaskWaiting>>,
    /// task_key -> 上一实例完成状态，未配置的返回Unknown
    pub prev_status: Mutex<HashMap<String, PrevTaskStatus>>,
    /// 锁定这些task_key时报错
    pub lock_failures: Mutex<HashSet<String>>,
    /// 推送这些task_key时报错
    pub push_failures: Mutex<HashSet<String>>,
    pub pushed: Mutex<Vec<TaskWaiting>>,
    pub fired: Mutex<Vec<TaskBaseContext>>,
    pub generations: Mutex<Vec<GeneratedBatch>>,
    /// 按查询顺序（偏移降序）排列的过期记录全集
    pub expire_records: Mutex<Vec<TaskRecord>>,
    pub handled_expire: Mutex<Vec<i64>>,
    /// 每次分页查询的(start, limit)
    pub list_expire_calls: Mutex<Vec<(i64, i64)>>,
    pub project_codes: Mutex<HashSet<String>>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cron_jobs(jobs: Vec<JobCron>) -> Self {
        let repo = Self::new();
        *repo.cron_jobs.lock().unwrap() = jobs;
        repo
    }

    pub fn pushed_keys(&self) -> Vec<String> {
        self.pushed
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.task_key.clone())
            .collect()
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn find_running_cron_jobs(&self, cluster: &str) -> SchedulerResult<Vec<JobCron>> {
        Ok(self
            .cron_jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.cluster == cluster && !job.pause)
            .cloned()
            .collect())
    }

    async fn save_generated_tasks(
        &self,
        _local_identification: &str,
        job: &JobCron,
        tasks: &[TaskWaiting],
        watermark: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        self.generations.lock().unwrap().push(GeneratedBatch {
            job_key: job.job_key.clone(),
            task_keys: tasks.iter().map(|t| t.task_key.clone()).collect(),
            trigger_times: tasks.iter().map(|t| t.trigger_time).collect(),
            watermark,
        });
        Ok(())
    }

    async fn find_trigger_tasks(
        &self,
        now: DateTime<Utc>,
        limit: u32,
        cluster: &str,
    ) -> SchedulerResult<Vec<TaskWaiting>> {
        let pushed: HashSet<String> = self.pushed_keys().into_iter().collect();
        Ok(self
            .waiting_tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                t.cluster == cluster && t.trigger_time <= now && !pushed.contains(&t.task_key)
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn lock_push_task(
        &self,
        task: &TaskWaiting,
        _cluster: &str,
        _local_identification: &str,
    ) -> SchedulerResult<PrevTaskStatus> {
        if self.lock_failures.lock().unwrap().contains(&task.task_key) {
            return Err(SchedulerError::repository(format!(
                "锁定任务 {} 失败",
                task.task_key
            )));
        }
        Ok(self
            .prev_status
            .lock()
            .unwrap()
            .get(&task.task_key)
            .copied()
            .unwrap_or(PrevTaskStatus::Unknown))
    }

    async fn push_task(&self, task: &TaskWaiting, _cluster: &str) -> SchedulerResult<()> {
        if self.push_failures.lock().unwrap().contains(&task.task_key) {
            return Err(SchedulerError::coordination(format!(
                "发布任务 {} 失败",
                task.task_key
            )));
        }
        self.pushed.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn fire_overstock_tasks(
        &self,
        tasks: &[TaskBaseContext],
        _cluster: &str,
    ) -> SchedulerResult<()> {
        self.fired.lock().unwrap().extend_from_slice(tasks);
        Ok(())
    }

    async fn count_expire_task_records(
        &self,
        _now: DateTime<Utc>,
        cluster: &str,
    ) -> SchedulerResult<i64> {
        Ok(self
            .expire_records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.cluster == cluster)
            .count() as i64)
    }

    async fn list_expire_task_records(
        &self,
        _now: DateTime<Utc>,
        start: i64,
        limit: i64,
        cluster: &str,
    ) -> SchedulerResult<Vec<TaskRecord>> {
        self.list_expire_calls.lock().unwrap().push((start, limit));
        let records: Vec<TaskRecord> = self
            .expire_records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.cluster == cluster)
            .cloned()
            .collect();
        let start = start.max(0) as usize;
        if start >= records.len() {
            return Ok(Vec::new());
        }
        let end = (start + limit.max(0) as usize).min(records.len());
        Ok(records[start..end].to_vec())
    }

    async fn handle_expire_task(
        &self,
        record: &TaskRecord,
        _cluster: &str,
    ) -> SchedulerResult<()> {
        self.handled_expire.lock().unwrap().push(record.id);
        Ok(())
    }

    async fn select_service_project_codes(&self) -> SchedulerResult<HashSet<String>> {
        Ok(self.project_codes.lock().unwrap().clone())
    }
}

pub fn job_cron(job_key: &str, cron_expression: &str, rely: bool) -> JobCron {
    JobCron {
        id: 1,
        job_key: job_key.to_string(),
        cluster: "default".to_string(),
        project_code: "trade".to_string(),
        pause: false,
        cron_expression: cron_expression.to_string(),
        last_generate_trigger_time: None,
        rely,
    }
}

pub fn task_waiting(task_key: &str, rely: bool, trigger_time: DateTime<Utc>) -> TaskWaiting {
    TaskWaiting {
        id: 0,
        task_key: task_key.to_string(),
        job_key: format!("job-{task_key}"),
        project_code: "trade".to_string(),
        trigger_time,
        rely,
        cluster: "default".to_string(),
    }
}

pub fn task_record(id: i64) -> TaskRecord {
    TaskRecord {
        id,
        task_key: format!("task-{id}"),
        expire_time: Utc::now() - Duration::minutes(id),
        cluster: "default".to_string(),
    }
}
