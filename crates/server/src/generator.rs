use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error};

use cronmaster_core::SchedulerResult;
use cronmaster_domain::entities::{JobCron, TaskWaiting};
use cronmaster_domain::repositories::ScheduleRepository;

use crate::context::ServerContext;
use crate::cron_planner::CronPlanner;

/// cron类型作业展开器
///
/// 遍历集群内未暂停的cron作业，为每个作业生成未来一个时间窗口内的
/// 待执行任务。单个作业展开失败不影响其余作业。落库与水位推进由
/// 存储层在同一事务内完成，任务标识按(作业, 触发时间)确定性生成，
/// 重复展开由存储层按task_key去重。
pub struct CronTaskGenerator {
    context: Arc<ServerContext>,
    repository: Arc<dyn ScheduleRepository>,
    /// 是否补偿生成水位之后漏掉的最近一个触发点
    append_previous_task: bool,
    /// 展开的未来时间窗口（分钟）
    generate_interval_min: i64,
}

impl CronTaskGenerator {
    pub fn new(
        context: Arc<ServerContext>,
        repository: Arc<dyn ScheduleRepository>,
        append_previous_task: bool,
        generate_interval_min: i64,
    ) -> Self {
        Self {
            context,
            repository,
            append_previous_task,
            generate_interval_min,
        }
    }

    /// 执行一轮展开，返回生成的任务总数
    pub async fn generate_once(&self) -> SchedulerResult<usize> {
        let jobs = self
            .repository
            .find_running_cron_jobs(self.context.cluster())
            .await?;
        if jobs.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut generated = 0;
        for job in &jobs {
            match self.expand_job(job, now).await {
                Ok(count) => generated += count,
                Err(e) => error!("展开cron作业 {} 失败: {}", job.job_key, e),
            }
        }
        debug!("本轮共展开 {} 个待执行任务", generated);
        Ok(generated)
    }

    async fn expand_job(&self, job: &JobCron, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let planner = CronPlanner::new(&job.cron_expression)?;
        let until = now + Duration::minutes(self.generate_interval_min);

        let mut trigger_times = Vec::new();
        if self.append_previous_task {
            if let Some(watermark) = job.last_generate_trigger_time {
                // 补偿(水位, now]内最后一个漏掉的触发点
                if let Some(missed) = planner.latest_between(watermark, now) {
                    trigger_times.push(missed);
                }
            }
        }
        trigger_times.extend(planner.occurrences_between(now, until));

        let tasks: Vec<TaskWaiting> = trigger_times
            .iter()
            .map(|trigger_time| TaskWaiting {
                id: 0, // 由存储层生成
                task_key: job.task_key_at(*trigger_time),
                job_key: job.job_key.clone(),
                project_code: job.project_code.clone(),
                trigger_time: *trigger_time,
                rely: job.rely,
                cluster: job.cluster.clone(),
            })
            .collect();

        self.repository
            .save_generated_tasks(self.context.local_identification(), job, &tasks, now)
            .await?;
        Ok(tasks.len())
    }
}
