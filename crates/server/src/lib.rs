//! 调度服务端核心
//!
//! 围绕协调服务上的临时节点做master选举，master节点负责cron作业
//! 展开、待执行任务推送与过期任务对账，全部节点参与心跳巡检。

pub mod context;
pub mod cron_planner;
pub mod dispatch;
pub mod elector;
pub mod expire;
pub mod generator;
pub mod heartbeat;
pub mod recovery;
pub mod server;

#[cfg(test)]
pub mod test_utils;


pub use context::ServerContext;
pub use elector::MasterElector;
pub use server::SchedulerServer;
