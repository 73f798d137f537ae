use std::collections::{HashMap, HashSet};

use tokio::sync::{Mutex, RwLock};

use cronmaster_domain::entities::{ClientInfo, NodeServer};
use cronmaster_domain::paths;

use crate::elector::MasterElector;

/// 进程级共享的服务端上下文
///
/// cluster与本机标识初始化后不可变；master引用与客户端缓存是仅有的
/// 多执行流并发修改的状态，替换粒度分别是整个master引用和单个项目的
/// 完整客户端映射，读方不会看到半更新的值。
pub struct ServerContext {
    cluster: String,
    local_identification: String,
    elector: MasterElector,
    /// 项目标识 -> (客户端标识 -> 客户端信息)
    client_node_map: RwLock<HashMap<String, HashMap<String, ClientInfo>>>,
    /// 已注册过客户端watch的项目集合
    project_codes: Mutex<HashSet<String>>,
}

impl ServerContext {
    pub fn new<S: Into<String>>(cluster: S, local_identification: S) -> Self {
        Self {
            cluster: cluster.into(),
            local_identification: local_identification.into(),
            elector: MasterElector::new(),
            client_node_map: RwLock::new(HashMap::new()),
            project_codes: Mutex::new(HashSet::new()),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn local_identification(&self) -> &str {
        &self.local_identification
    }

    pub fn elector(&self) -> &MasterElector {
        &self.elector
    }

    /// 本机在协调服务上的注册路径
    pub fn local_node_path(&self) -> String {
        paths::local_node_path(&self.cluster, &self.local_identification)
    }

    /// 始终反映最近一次成功选举的结论，而非启动时的快照
    pub async fn is_master(&self) -> bool {
        self.elector.is_master(&self.local_identification).await
    }

    pub async fn master(&self) -> Option<NodeServer> {
        self.elector.master().await
    }

    /// 整体替换一个项目的客户端映射，其他项目不受影响
    pub async fn replace_project_clients(
        &self,
        project_code: &str,
        clients: HashMap<String, ClientInfo>,
    ) {
        self.client_node_map
            .write()
            .await
            .insert(project_code.to_string(), clients);
    }

    pub async fn project_clients(&self, project_code: &str) -> HashMap<String, ClientInfo> {
        self.client_node_map
            .read()
            .await
            .get(project_code)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_project_tracked(&self, project_code: &str) -> bool {
        self.project_codes.lock().await.contains(project_code)
    }

    /// 标记项目已注册watch，返回是否为新项目
    pub async fn track_project(&self, project_code: &str) -> bool {
        self.project_codes
            .lock()
            .await
            .insert(project_code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronmaster_domain::entities::{ClientData, ClientPath};

    fn client_info(identification: &str) -> ClientInfo {
        ClientInfo {
            path: format!("/cronmaster/default/client/trade/{identification}"),
            client_path: ClientPath {
                identification: identification.to_string(),
                host: "127.0.0.1".to_string(),
            },
            data: ClientData {
                version: Some("1.0".to_string()),
                weight: 1,
            },
        }
    }

    #[tokio::test]
    async fn test_is_master_tracks_elector_state() {
        let context = ServerContext::new("default", "node-b");
        assert!(!context.is_master().await);

        context
            .elector()
            .elect(&["node-b".to_string(), "node-c".to_string()])
            .await;
        assert!(context.is_master().await);

        context
            .elector()
            .elect(&["node-a".to_string(), "node-b".to_string()])
            .await;
        assert!(!context.is_master().await);
    }

    #[tokio::test]
    async fn test_replace_project_clients_is_per_project() {
        let context = ServerContext::new("default", "node-a");
        let mut trade = HashMap::new();
        trade.insert("c1".to_string(), client_info("c1"));
        context.replace_project_clients("trade", trade).await;

        let mut pay = HashMap::new();
        pay.insert("c2".to_string(), client_info("c2"));
        context.replace_project_clients("pay", pay).await;

        // trade整体替换为新映射，pay不受影响
        let mut trade_next = HashMap::new();
        trade_next.insert("c3".to_string(), client_info("c3"));
        context.replace_project_clients("trade", trade_next).await;

        let trade_now = context.project_clients("trade").await;
        assert_eq!(trade_now.len(), 1);
        assert!(trade_now.contains_key("c3"));
        assert!(context.project_clients("pay").await.contains_key("c2"));
    }

    #[tokio::test]
    async fn test_track_project_reports_new_only_once() {
        let context = ServerContext::new("default", "node-a");
        assert!(!context.is_project_tracked("trade").await);
        assert!(context.track_project("trade").await);
        assert!(!context.track_project("trade").await);
        assert!(context.is_project_tracked("trade").await);
    }

    #[tokio::test]
    async fn test_local_node_path() {
        let context = ServerContext::new("default", "host_42");
        assert_eq!(
            context.local_node_path(),
            "/cronmaster/default/server/host_42"
        );
    }
}
