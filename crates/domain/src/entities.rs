use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// cron类型作业定义
///
/// 只有cron作业展开循环会推进 last_generate_trigger_time，其余组件只读。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCron {
    pub id: i64,
    /// 作业的逻辑标识，同一作业的历次实例共享
    pub job_key: String,
    pub cluster: String,
    pub project_code: String,
    /// 暂停中的作业不参与展开
    pub pause: bool,
    pub cron_expression: String,
    /// 最近一次展开的水位时间
    pub last_generate_trigger_time: Option<DateTime<Utc>>,
    /// 生成的任务实例是否依赖上一个实例执行完成
    pub rely: bool,
}

impl JobCron {
    /// 由作业与触发时间派生确定性的任务标识，重复展开时由存储层据此去重
    pub fn task_key_at(&self, trigger_time: DateTime<Utc>) -> String {
        format!("{}_{}", self.job_key, trigger_time.timestamp_millis())
    }
}

/// 待执行任务实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWaiting {
    pub id: i64,
    pub task_key: String,
    pub job_key: String,
    pub project_code: String,
    pub trigger_time: DateTime<Utc>,
    /// true表示上一个实例未完成时不可推送
    pub rely: bool,
    pub cluster: String,
}

/// 已发布到协调服务的任务节点
///
/// 子节点名即本结构的JSON（不含path），解析后补写path。
/// 自然顺序为触发顺序：先按触发时间，再按发布序号。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBaseContext {
    pub task_key: String,
    pub project_code: String,
    pub trigger_time: DateTime<Utc>,
    pub sequence: i64,
    #[serde(skip)]
    pub path: String,
}

impl Ord for TaskBaseContext {
    fn cmp(&self, other: &Self) -> Ordering {
        self.trigger_time
            .cmp(&other.trigger_time)
            .then_with(|| self.sequence.cmp(&other.sequence))
            .then_with(|| self.task_key.cmp(&other.task_key))
    }
}

impl PartialOrd for TaskBaseContext {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TaskBaseContext {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TaskBaseContext {}

/// 等待清算的过期任务记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub task_key: String,
    pub expire_time: DateTime<Utc>,
    pub cluster: String,
}

/// 集群服务端节点
///
/// 选举集合就是选举根节点下当前存活的注册集合，子节点名即identification。
/// 全序关系必须在所有节点上一致，否则会脑裂，这里按identification字典序。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeServer {
    pub identification: String,
}

impl NodeServer {
    pub fn new<S: Into<String>>(identification: S) -> Self {
        Self {
            identification: identification.into(),
        }
    }

    /// 生成本机节点标识
    pub fn local_identification() -> String {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown-host".to_string());
        format!("{}_{}", host, std::process::id())
    }
}

/// 写入本机注册节点、用于强制触发重新选举的通知载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterElectorNotice {
    pub identification: String,
    pub notice_time: DateTime<Utc>,
}

impl MasterElectorNotice {
    pub fn new<S: Into<String>>(identification: S) -> Self {
        Self {
            identification: identification.into(),
            notice_time: Utc::now(),
        }
    }
}

/// 客户端注册身份，子节点名即本结构的JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientPath {
    pub identification: String,
    pub host: String,
}

/// 客户端注册节点上的存活数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientData {
    pub version: Option<String>,
    pub weight: i32,
}

/// 按项目缓存的客户端完整信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub path: String,
    pub client_path: ClientPath,
    pub data: ClientData,
}

/// 同一逻辑作业上一个实例的完成状态
///
/// 三态必须显式建模：只有明确的"未完成"才阻塞依赖推送，
/// 没有历史实例或状态未知时照常推送。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrevTaskStatus {
    Completed,
    NotCompleted,
    Unknown,
}
