//! 协调服务的路径规划
//!
//! 选举根节点与服务端注册路径是同一个节点，客户端注册与任务发布
//! 按项目划分子树。

pub const ROOT: &str = "/cronmaster";
pub const SEPARATOR: &str = "/";

/// 服务端注册路径，同时是master选举根节点
pub fn server_node_path(cluster: &str) -> String {
    format!("{ROOT}/{cluster}/server")
}

/// 本机在服务端注册路径下的临时节点
pub fn local_node_path(cluster: &str, identification: &str) -> String {
    format!("{}/{}", server_node_path(cluster), identification)
}

/// 项目客户端注册路径
pub fn client_node_path(cluster: &str, project_code: &str) -> String {
    format!("{ROOT}/{cluster}/client/{project_code}")
}

/// 项目任务发布路径
pub fn client_task_path(cluster: &str, project_code: &str) -> String {
    format!("{ROOT}/{cluster}/task/{project_code}")
}
