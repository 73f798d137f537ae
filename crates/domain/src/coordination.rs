//! 协调服务抽象
//!
//! 对标ZooKeeper一类的层级注册中心：持久节点承载结构，临时节点承载存活，
//! 子节点变化通过通道异步投递。每个被watch的路径由一个独立消费任务处理
//! 事件，业务处理抛错不会影响订阅本身。

use async_trait::async_trait;
use tokio::sync::mpsc;

use cronmaster_core::SchedulerResult;

/// 一次子节点集合变化事件，携带变化后的完整子节点列表
#[derive(Debug, Clone)]
pub struct ChildChangeEvent {
    pub path: String,
    pub children: Vec<String>,
}

#[async_trait]
pub trait CoordinationRegistry: Send + Sync {
    async fn exists(&self, path: &str) -> SchedulerResult<bool>;

    /// 创建持久节点，父节点不存在时一并创建
    async fn create_persistent(&self, path: &str) -> SchedulerResult<()>;

    /// 创建临时节点，连接断开后由协调服务自动移除
    async fn create_ephemeral(&self, path: &str, data: Option<&str>) -> SchedulerResult<()>;

    /// 删除节点，返回节点是否存在
    async fn delete(&self, path: &str) -> SchedulerResult<bool>;

    async fn children(&self, path: &str) -> SchedulerResult<Vec<String>>;

    async fn read_data(&self, path: &str) -> SchedulerResult<Option<String>>;

    async fn write_data(&self, path: &str, data: &str) -> SchedulerResult<()>;

    /// 订阅子节点变化，事件在独立通道上投递
    async fn subscribe_children(
        &self,
        path: &str,
    ) -> SchedulerResult<mpsc::UnboundedReceiver<ChildChangeEvent>>;
}
