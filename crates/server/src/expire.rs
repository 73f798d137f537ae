use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error};

use cronmaster_core::SchedulerResult;
use cronmaster_domain::repositories::ScheduleRepository;

use crate::context::ServerContext;

/// 分页游标步长
const CURSOR: i64 = 100;

/// 过期任务对账
///
/// 先取过期记录总数，再从最后一个不完整页开始向前逐页回扫，
/// 每页按游标步长推进。页内单条处理失败不中断本页与后续页。
/// 计数在回扫期间发生变化时，漏掉的记录留给下一轮。
pub struct ExpireTaskReconciler {
    context: Arc<ServerContext>,
    repository: Arc<dyn ScheduleRepository>,
}

impl ExpireTaskReconciler {
    pub fn new(context: Arc<ServerContext>, repository: Arc<dyn ScheduleRepository>) -> Self {
        Self {
            context,
            repository,
        }
    }

    /// 执行一轮对账，返回成功处理的记录数
    pub async fn reconcile_once(&self) -> SchedulerResult<usize> {
        let now = Utc::now();
        let cluster = self.context.cluster();
        let count = self
            .repository
            .count_expire_task_records(now, cluster)
            .await?;
        if count <= 0 {
            return Ok(0);
        }
        debug!("本轮待对账的过期任务 {} 条", count);

        // 从尾部的不完整页开始，向前整页回扫
        let mut start = count / CURSOR * CURSOR;
        let mut limit = count - start;
        let mut handled = 0;
        loop {
            let records = self
                .repository
                .list_expire_task_records(now, start, limit, cluster)
                .await?;
            for record in &records {
                match self.repository.handle_expire_task(record, cluster).await {
                    Ok(()) => handled += 1,
                    Err(e) => error!("处理过期任务记录 {} 失败: {}", record.id, e),
                }
            }
            start -= CURSOR;
            limit = CURSOR;
            if start < 0 {
                break;
            }
        }
        Ok(handled)
    }
}
