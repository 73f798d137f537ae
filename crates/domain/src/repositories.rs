//! 存储层抽象
//!
//! 定义调度核心消费的查询面，遵循依赖倒置原则。发布、回收一类需要同时
//! 落库和写协调服务的操作由实现方内部持有协调服务句柄完成。

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cronmaster_core::SchedulerResult;

use crate::entities::{JobCron, PrevTaskStatus, TaskBaseContext, TaskRecord, TaskWaiting};

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// 查询集群内未暂停的cron作业
    async fn find_running_cron_jobs(&self, cluster: &str) -> SchedulerResult<Vec<JobCron>>;

    /// 落库一个作业本次展开的全部任务并推进水位，二者在同一事务内。
    /// 实现必须按task_key去重，保证重复展开不会产生重复任务。
    async fn save_generated_tasks(
        &self,
        local_identification: &str,
        job: &JobCron,
        tasks: &[TaskWaiting],
        watermark: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    /// 查询触发时间已到的待执行任务，按触发时间升序，最多limit条
    async fn find_trigger_tasks(
        &self,
        now: DateTime<Utc>,
        limit: u32,
        cluster: &str,
    ) -> SchedulerResult<Vec<TaskWaiting>>;

    /// 锁定一个待推送任务，并返回同一逻辑作业上一个实例的完成状态
    async fn lock_push_task(
        &self,
        task: &TaskWaiting,
        cluster: &str,
        local_identification: &str,
    ) -> SchedulerResult<PrevTaskStatus>;

    /// 将已锁定的任务发布到协调服务的项目任务路径下
    async fn push_task(&self, task: &TaskWaiting, cluster: &str) -> SchedulerResult<()>;

    /// 强制清算一批积压任务，将其移出协调服务
    async fn fire_overstock_tasks(
        &self,
        tasks: &[TaskBaseContext],
        cluster: &str,
    ) -> SchedulerResult<()>;

    /// 统计截止now已过期的任务记录数
    async fn count_expire_task_records(
        &self,
        now: DateTime<Utc>,
        cluster: &str,
    ) -> SchedulerResult<i64>;

    /// 分页查询过期任务记录，[start, start+limit)
    async fn list_expire_task_records(
        &self,
        now: DateTime<Utc>,
        start: i64,
        limit: i64,
        cluster: &str,
    ) -> SchedulerResult<Vec<TaskRecord>>;

    /// 清算单条过期任务记录，终态由存储层决定
    async fn handle_expire_task(&self, record: &TaskRecord, cluster: &str)
        -> SchedulerResult<()>;

    /// 查询当前在用的全部项目标识
    async fn select_service_project_codes(&self) -> SchedulerResult<HashSet<String>>;
}
