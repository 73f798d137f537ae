use tokio::sync::RwLock;
use tracing::{info, warn};

use cronmaster_domain::entities::NodeServer;

/// master选举器
///
/// 选举策略：identification最小者当选。该全序关系在所有节点上一致，
/// 保证观察到相同存活集合的节点得出相同结论。
#[derive(Default)]
pub struct MasterElector {
    master: RwLock<Option<NodeServer>>,
}

impl MasterElector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 纯选举函数：从存活子节点集合推算master
    pub fn elect_from(children: &[String]) -> Option<NodeServer> {
        children
            .iter()
            .filter(|child| !child.is_empty())
            .map(|child| NodeServer::new(child.as_str()))
            .min()
    }

    /// 依据最新存活集合重新选举
    ///
    /// 空集合不会清空已有结论，保留上一次的决定直到下一次成功的推算。
    pub async fn elect(&self, children: &[String]) {
        match Self::elect_from(children) {
            Some(elected) => {
                let mut master = self.master.write().await;
                let changed = master
                    .as_ref()
                    .map(|m| m.identification != elected.identification)
                    .unwrap_or(true);
                if changed {
                    info!("master变更为 {}", elected.identification);
                }
                *master = Some(elected);
            }
            None => {
                warn!("存活节点集合为空，保留上一次的master结论");
            }
        }
    }

    pub async fn master(&self) -> Option<NodeServer> {
        self.master.read().await.clone()
    }

    pub async fn is_master(&self, identification: &str) -> bool {
        self.master
            .read()
            .await
            .as_ref()
            .map(|m| m.identification == identification)
            .unwrap_or(false)
    }
}
