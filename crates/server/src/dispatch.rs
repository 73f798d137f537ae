use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use cronmaster_core::SchedulerResult;
use cronmaster_domain::entities::PrevTaskStatus;
use cronmaster_domain::repositories::ScheduleRepository;

use crate::context::ServerContext;
use crate::recovery::OverstockRecovery;

/// 待执行任务推送器
///
/// 每轮扫描触发时间已到的待执行任务，逐个锁定后发布到协调服务。
/// 锁定与发布的失败都按任务隔离，失败的任务留在待执行集合里等
/// 下一轮自然重试。
pub struct WaitingTaskDispatcher {
    context: Arc<ServerContext>,
    repository: Arc<dyn ScheduleRepository>,
    recovery: OverstockRecovery,
    /// 单轮扫描上限
    scroll: u32,
}

impl WaitingTaskDispatcher {
    pub fn new(
        context: Arc<ServerContext>,
        repository: Arc<dyn ScheduleRepository>,
        recovery: OverstockRecovery,
        scroll: u32,
    ) -> Self {
        Self {
            context,
            repository,
            recovery,
            scroll,
        }
    }

    /// 执行一轮推送，返回成功发布的任务数
    pub async fn push_once(&self) -> SchedulerResult<usize> {
        let now = Utc::now();
        let cluster = self.context.cluster();
        let tasks = self
            .repository
            .find_trigger_tasks(now, self.scroll, cluster)
            .await?;
        let mut pushed = 0;
        for task in &tasks {
            let prev_status = match self
                .repository
                .lock_push_task(task, cluster, self.context.local_identification())
                .await
            {
                Ok(status) => status,
                Err(e) => {
                    error!("锁定待推送任务 {} 失败: {}", task.task_key, e);
                    continue;
                }
            };
            // 只有明确的"未完成"才阻塞依赖任务，无历史实例或状态未知照常推送
            let blocked = task.rely
                && match prev_status {
                    PrevTaskStatus::NotCompleted => true,
                    PrevTaskStatus::Completed | PrevTaskStatus::Unknown => false,
                };
            if blocked {
                debug!("任务 {} 的上一个实例未完成，本轮跳过", task.task_key);
                continue;
            }
            match self.repository.push_task(task, cluster).await {
                Ok(()) => {
                    pushed += 1;
                    if let Err(e) = self.recovery.recover(&task.project_code).await {
                        error!("回收项目 {} 积压任务失败: {}", task.project_code, e);
                    }
                }
                Err(e) => error!("发布任务 {} 失败: {}", task.task_key, e),
            }
        }
        Ok(pushed)
    }
}
