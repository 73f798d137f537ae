//! 内存协调服务实现
//!
//! 用进程内结构模拟层级注册中心，适用于嵌入式部署与测试。
//! 子节点变化通过无界通道投递，通道关闭的订阅者会被自动清理。
//! 没有真实会话概念，节点下线通过 `expire_ephemerals` 模拟。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use cronmaster_core::{SchedulerError, SchedulerResult};
use cronmaster_domain::coordination::{ChildChangeEvent, CoordinationRegistry};

#[derive(Debug, Clone)]
struct NodeEntry {
    data: Option<String>,
    ephemeral: bool,
}

#[derive(Default)]
pub struct MemoryCoordinationRegistry {
    /// 路径 -> 节点，BTreeMap便于按前缀遍历子树
    nodes: RwLock<BTreeMap<String, NodeEntry>>,
    /// 被watch的路径 -> 订阅者发送端
    watchers: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<ChildChangeEvent>>>>,
}

impl MemoryCoordinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟会话断开：移除指定子树内（含子树根）的全部临时节点，
    /// 持久节点保持不动，返回移除的数量
    pub async fn expire_ephemerals(&self, subtree: &str) -> SchedulerResult<usize> {
        Self::validate_path(subtree)?;
        let removed: Vec<String> = {
            let mut nodes = self.nodes.write().await;
            let prefix = format!("{subtree}/");
            let targets: Vec<String> = nodes
                .iter()
                .filter(|(key, entry)| {
                    entry.ephemeral && (key.as_str() == subtree || key.starts_with(&prefix))
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &targets {
                nodes.remove(key);
            }
            targets
        };
        let mut parents: Vec<String> = removed
            .iter()
            .filter_map(|path| Self::parent_of(path).map(str::to_string))
            .collect();
        parents.sort();
        parents.dedup();
        for parent in &parents {
            debug!("临时节点下线，通知 {}", parent);
            self.notify_children_changed(parent).await;
        }
        Ok(removed.len())
    }

    fn validate_path(path: &str) -> SchedulerResult<()> {
        if !path.starts_with('/') || path.ends_with('/') || path.len() < 2 {
            return Err(SchedulerError::coordination(format!("非法路径: {path}")));
        }
        Ok(())
    }

    fn parent_of(path: &str) -> Option<&str> {
        path.rfind('/').filter(|idx| *idx > 0).map(|idx| &path[..idx])
    }

    fn children_of(nodes: &BTreeMap<String, NodeEntry>, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect()
    }

    /// 向父路径的订阅者投递变化事件，顺带清理已关闭的订阅者
    async fn notify_children_changed(&self, parent: &str) {
        let children = {
            let nodes = self.nodes.read().await;
            Self::children_of(&nodes, parent)
        };
        let mut watchers = self.watchers.write().await;
        if let Some(senders) = watchers.get_mut(parent) {
            senders.retain(|tx| {
                tx.send(ChildChangeEvent {
                    path: parent.to_string(),
                    children: children.clone(),
                })
                .is_ok()
            });
        }
    }

    async fn create_node(
        &self,
        path: &str,
        data: Option<&str>,
        ephemeral: bool,
        create_parents: bool,
    ) -> SchedulerResult<()> {
        Self::validate_path(path)?;
        {
            let mut nodes = self.nodes.write().await;
            if nodes.contains_key(path) {
                return Err(SchedulerError::coordination(format!("节点已存在: {path}")));
            }
            if let Some(parent) = Self::parent_of(path) {
                if !nodes.contains_key(parent) {
                    if !create_parents {
                        return Err(SchedulerError::node_not_found(parent));
                    }
                    let mut ancestors = Vec::new();
                    let mut cursor = Some(parent);
                    while let Some(p) = cursor {
                        if nodes.contains_key(p) {
                            break;
                        }
                        ancestors.push(p.to_string());
                        cursor = Self::parent_of(p);
                    }
                    for ancestor in ancestors.into_iter().rev() {
                        nodes.insert(
                            ancestor,
                            NodeEntry {
                                data: None,
                                ephemeral: false,
                            },
                        );
                    }
                }
            }
            nodes.insert(
                path.to_string(),
                NodeEntry {
                    data: data.map(str::to_string),
                    ephemeral,
                },
            );
        }
        debug!("创建节点 {} ephemeral={}", path, ephemeral);
        if let Some(parent) = Self::parent_of(path) {
            self.notify_children_changed(parent).await;
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationRegistry for MemoryCoordinationRegistry {
    async fn exists(&self, path: &str) -> SchedulerResult<bool> {
        Ok(self.nodes.read().await.contains_key(path))
    }

    async fn create_persistent(&self, path: &str) -> SchedulerResult<()> {
        self.create_node(path, None, false, true).await
    }

    async fn create_ephemeral(&self, path: &str, data: Option<&str>) -> SchedulerResult<()> {
        self.create_node(path, data, true, false).await
    }

    async fn delete(&self, path: &str) -> SchedulerResult<bool> {
        Self::validate_path(path)?;
        let removed = {
            let mut nodes = self.nodes.write().await;
            if !nodes.contains_key(path) {
                false
            } else {
                // 连同子树一并移除
                let prefix = format!("{path}/");
                let descendants: Vec<String> = nodes
                    .range(prefix.clone()..)
                    .take_while(|(key, _)| key.starts_with(&prefix))
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in descendants {
                    nodes.remove(&key);
                }
                nodes.remove(path);
                true
            }
        };
        if removed {
            debug!("删除节点 {}", path);
            if let Some(parent) = Self::parent_of(path) {
                self.notify_children_changed(parent).await;
            }
        }
        Ok(removed)
    }

    async fn children(&self, path: &str) -> SchedulerResult<Vec<String>> {
        let nodes = self.nodes.read().await;
        if !nodes.contains_key(path) {
            return Err(SchedulerError::node_not_found(path));
        }
        Ok(Self::children_of(&nodes, path))
    }

    async fn read_data(&self, path: &str) -> SchedulerResult<Option<String>> {
        Ok(self
            .nodes
            .read()
            .await
            .get(path)
            .and_then(|entry| entry.data.clone()))
    }

    async fn write_data(&self, path: &str, data: &str) -> SchedulerResult<()> {
        {
            let mut nodes = self.nodes.write().await;
            match nodes.get_mut(path) {
                Some(entry) => entry.data = Some(data.to_string()),
                None => return Err(SchedulerError::node_not_found(path)),
            }
        }
        // 数据变化同样唤醒父路径的订阅者，重选通知依赖该行为
        if let Some(parent) = Self::parent_of(path) {
            self.notify_children_changed(parent).await;
        }
        Ok(())
    }

    async fn subscribe_children(
        &self,
        path: &str,
    ) -> SchedulerResult<mpsc::UnboundedReceiver<ChildChangeEvent>> {
        Self::validate_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers
            .write()
            .await
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
