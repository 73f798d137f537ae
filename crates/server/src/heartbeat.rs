use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use cronmaster_core::{SchedulerError, SchedulerResult};
use cronmaster_domain::coordination::CoordinationRegistry;
use cronmaster_domain::entities::{ClientData, ClientInfo, ClientPath, MasterElectorNotice};
use cronmaster_domain::paths;
use cronmaster_domain::repositories::ScheduleRepository;

use crate::context::ServerContext;
use crate::elector::MasterElector;

/// 心跳巡检
///
/// 每个节点都执行，不区分master。一轮心跳做两件彼此独立的事：
/// 注册自检（根节点、本机临时节点、master结论与存活集合的一致性）
/// 和为新上线的项目补注册客户端watch。任一步失败只记录，不影响
/// 另一步，也不中断心跳循环。
pub struct HeartbeatMonitor {
    context: Arc<ServerContext>,
    registry: Arc<dyn CoordinationRegistry>,
    repository: Arc<dyn ScheduleRepository>,
}

impl HeartbeatMonitor {
    pub fn new(
        context: Arc<ServerContext>,
        registry: Arc<dyn CoordinationRegistry>,
        repository: Arc<dyn ScheduleRepository>,
    ) -> Self {
        Self {
            context,
            registry,
            repository,
        }
    }

    /// 执行一轮心跳
    pub async fn beat_once(&self) {
        if let Err(e) = self.check_registration().await {
            error!("心跳注册自检失败: {}", e);
        }
        if let Err(e) = self.watch_new_projects().await {
            error!("心跳项目巡检失败: {}", e);
        }
    }

    /// 注册自检
    ///
    /// 根节点缺失说明协调服务还没准备好，只告警等下一轮；本机临时
    /// 节点缺失说明会话曾经断开，重新注册后本轮结束；两者都在时核对
    /// 存活集合推算的master与本机持有的结论，不一致则向本机节点写入
    /// 重选通知，借子节点数据变化唤醒各节点的watch。
    async fn check_registration(&self) -> SchedulerResult<()> {
        let root = paths::server_node_path(self.context.cluster());
        if !self.registry.exists(&root).await? {
            warn!("选举根节点 {} 不存在，等待下一轮心跳", root);
            return Ok(());
        }
        let local = self.context.local_node_path();
        if !self.registry.exists(&local).await? {
            warn!("本机注册节点 {} 缺失，重新注册", local);
            self.registry.create_ephemeral(&local, None).await?;
            return Ok(());
        }
        let children = self.registry.children(&root).await?;
        let observed = MasterElector::elect_from(&children);
        let held = self.context.master().await;
        let drifted = match (&observed, &held) {
            (Some(observed), Some(held)) => observed.identification != held.identification,
            (Some(_), None) => true,
            _ => false,
        };
        if drifted {
            let notice = MasterElectorNotice::new(self.context.local_identification());
            self.registry
                .write_data(&local, &serde_json::to_string(&notice)?)
                .await?;
            warn!("master结论与存活集合不一致，已写入重选通知");
        }
        Ok(())
    }

    /// 为新上线的项目注册客户端watch
    ///
    /// 单个项目注册失败不影响其余项目，下一轮心跳会重试。
    async fn watch_new_projects(&self) -> SchedulerResult<()> {
        let codes = self.repository.select_service_project_codes().await?;
        for code in codes {
            if self.context.is_project_tracked(&code).await {
                continue;
            }
            if let Err(e) = self.watch_project(&code).await {
                error!("注册项目 {} 客户端watch失败: {}", code, e);
            }
        }
        Ok(())
    }

    async fn watch_project(&self, project_code: &str) -> SchedulerResult<()> {
        let client_path = paths::client_node_path(self.context.cluster(), project_code);
        let mut events = self.registry.subscribe_children(&client_path).await?;
        // 订阅后先全量加载一次，watch事件只负责之后的变化
        refresh_client_nodes(&self.context, self.registry.as_ref(), project_code).await?;

        let context = self.context.clone();
        let registry = self.registry.clone();
        let code = project_code.to_string();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!(
                    "项目 {} 客户端集合变化，当前 {} 个",
                    code,
                    event.children.len()
                );
                if let Err(e) = refresh_client_nodes(&context, registry.as_ref(), &code).await {
                    // 刷新失败不退出消费循环，订阅保持有效
                    error!("刷新项目 {} 客户端缓存失败: {}", code, e);
                }
            }
        });
        // 消费任务就绪后才标记，中途失败的项目留给下一轮重试
        self.context.track_project(project_code).await;
        Ok(())
    }
}

/// 从注册中心全量重建一个项目的客户端缓存
///
/// 子节点名是客户端身份的JSON，节点数据是存活信息的JSON。
/// 身份或数据无法解析、数据为空的客户端不进缓存。
async fn refresh_client_nodes(
    context: &ServerContext,
    registry: &dyn CoordinationRegistry,
    project_code: &str,
) -> SchedulerResult<()> {
    let client_path = paths::client_node_path(context.cluster(), project_code);
    // 项目可能还没有任何客户端注册过，路径不存在等价于空集合
    let children = match registry.children(&client_path).await {
        Ok(children) => children,
        Err(SchedulerError::NodeNotFound(_)) => Vec::new(),
        Err(e) => return Err(e),
    };
    let mut clients = HashMap::new();
    for child in &children {
        let identity = match serde_json::from_str::<ClientPath>(child) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("客户端子节点 {} 无法解析，跳过: {}", child, e);
                continue;
            }
        };
        let node_path = format!("{client_path}/{child}");
        let raw = match registry.read_data(&node_path).await? {
            Some(raw) if !raw.is_empty() => raw,
            _ => continue,
        };
        let data = match serde_json::from_str::<ClientData>(&raw) {
            Ok(data) => data,
            Err(e) => {
                warn!("客户端 {} 的存活数据无法解析，跳过: {}", identity.identification, e);
                continue;
            }
        };
        clients.insert(
            identity.identification.clone(),
            ClientInfo {
                path: node_path,
                client_path: identity,
                data,
            },
        );
    }
    context.replace_project_clients(project_code, clients).await;
    Ok(())
}
