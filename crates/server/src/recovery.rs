use std::sync::Arc;

use rand::Rng;
use tracing::{debug, warn};

use cronmaster_core::SchedulerResult;
use cronmaster_domain::coordination::CoordinationRegistry;
use cronmaster_domain::entities::TaskBaseContext;
use cronmaster_domain::paths;
use cronmaster_domain::repositories::ScheduleRepository;

use crate::context::ServerContext;

/// 积压任务回收
///
/// 每次成功推送后按权重采样进入，命中后检查项目已发布任务是否超过
/// 阈值，超过则按自然顺序回收最早的一段，只保留最新的retain个。
/// 采样只控制检查频率，选择本身是精确的。
pub struct OverstockRecovery {
    context: Arc<ServerContext>,
    registry: Arc<dyn CoordinationRegistry>,
    repository: Arc<dyn ScheduleRepository>,
    /// 准入权重，0-100
    weight: u32,
    /// 积压阈值
    threshold: usize,
    /// 回收后保留的最新任务数量
    retain: usize,
}

impl OverstockRecovery {
    pub fn new(
        context: Arc<ServerContext>,
        registry: Arc<dyn CoordinationRegistry>,
        repository: Arc<dyn ScheduleRepository>,
        weight: u32,
        threshold: usize,
        retain: usize,
    ) -> Self {
        Self {
            context,
            registry,
            repository,
            weight,
            threshold,
            retain,
        }
    }

    /// 采样准入后执行一次回收，返回回收的任务数
    pub async fn recover(&self, project_code: &str) -> SchedulerResult<usize> {
        let roll = rand::rng().random_range(0..100u32);
        if roll >= self.weight {
            return Ok(0);
        }
        self.evict(project_code).await
    }

    async fn evict(&self, project_code: &str) -> SchedulerResult<usize> {
        let task_path = paths::client_task_path(self.context.cluster(), project_code);
        let children = self.registry.children(&task_path).await?;
        if children.len() <= self.threshold {
            debug!(
                "项目 {} 已发布任务 {} 个，未超过阈值 {}",
                project_code,
                children.len(),
                self.threshold
            );
            return Ok(0);
        }

        let mut tasks: Vec<TaskBaseContext> = Vec::with_capacity(children.len());
        for child in &children {
            match serde_json::from_str::<TaskBaseContext>(child) {
                Ok(mut task) => {
                    task.path = format!("{task_path}/{child}");
                    tasks.push(task);
                }
                Err(e) => warn!("任务子节点 {} 无法解析，跳过: {}", child, e),
            }
        }
        tasks.sort();

        let overstock_count = tasks.len().saturating_sub(self.retain);
        if overstock_count == 0 {
            return Ok(0);
        }
        let overstock = &tasks[..overstock_count];
        self.repository
            .fire_overstock_tasks(overstock, self.context.cluster())
            .await?;
        warn!(
            "项目 {} 积压 {} 个任务，已回收最早的 {} 个",
            project_code,
            tasks.len(),
            overstock.len()
        );
        Ok(overstock.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockScheduleRepository;
    use chrono::{Duration, Utc};
    use cronmaster_infrastructure::MemoryCoordinationRegistry;

    async fn publish_tasks(registry: &MemoryCoordinationRegistry, count: usize) {
        let base = paths::client_task_path("default", "trade");
        registry.create_persistent(&base).await.unwrap();
        let start = Utc::now();
        for sequence in 0..count {
            let task = TaskBaseContext {
                task_key: format!("task-{sequence}"),
                project_code: "trade".to_string(),
                trigger_time: start + Duration::seconds(sequence as i64),
                sequence: sequence as i64,
                path: String::new(),
            };
            let child_name = serde_json::to_string(&task).unwrap();
            registry
                .create_ephemeral(&format!("{base}/{child_name}"), None)
                .await
                .unwrap();
        }
    }

    fn recovery(
        registry: Arc<MemoryCoordinationRegistry>,
        repo: Arc<MockScheduleRepository>,
        weight: u32,
    ) -> OverstockRecovery {
        OverstockRecovery::new(
            Arc::new(ServerContext::new("default", "node-a")),
            registry,
            repo,
            weight,
            100,
            20,
        )
    }

    #[tokio::test]
    async fn test_evicts_all_but_newest_retain_when_over_threshold() {
        let registry = Arc::new(MemoryCoordinationRegistry::new());
        publish_tasks(&registry, 150).await;
        let repo = Arc::new(MockScheduleRepository::new());

        let recovered = recovery(registry, repo.clone(), 100)
            .recover("trade")
            .await
            .unwrap();

        // 150个任务保留最新20个，回收最早的130个
        assert_eq!(recovered, 130);
        let fired = repo.fired.lock().unwrap();
        assert_eq!(fired.len(), 130);
        // 回收的是自然顺序最靠前的一段
        for (index, task) in fired.iter().enumerate() {
            assert_eq!(task.sequence, index as i64);
            assert!(!task.path.is_empty());
        }
    }

    #[tokio::test]
    async fn test_no_eviction_at_or_below_threshold() {
        let registry = Arc::new(MemoryCoordinationRegistry::new());
        publish_tasks(&registry, 100).await;
        let repo = Arc::new(MockScheduleRepository::new());

        let recovered = recovery(registry, repo.clone(), 100)
            .recover("trade")
            .await
            .unwrap();

        assert_eq!(recovered, 0);
        assert!(repo.fired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_weight_never_admits() {
        let registry = Arc::new(MemoryCoordinationRegistry::new());
        publish_tasks(&registry, 150).await;
        let repo = Arc::new(MockScheduleRepository::new());

        let recovery = recovery(registry, repo.clone(), 0);
        for _ in 0..20 {
            assert_eq!(recovery.recover("trade").await.unwrap(), 0);
        }
        assert!(repo.fired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_task_path_surfaces_error() {
        let registry = Arc::new(MemoryCoordinationRegistry::new());
        let repo = Arc::new(MockScheduleRepository::new());
        let result = recovery(registry, repo, 100).recover("trade").await;
        assert!(result.is_err());
    }
}
