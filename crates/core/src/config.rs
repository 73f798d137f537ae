use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 服务端调度核心配置
///
/// 五个周期任务共用这一份配置。waiting_task_period_ms 是基准周期，
/// 推送循环实际按基准周期的20倍运行，调用方不需要自己乘。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 集群标识
    pub cluster: String,
    /// cron作业展开循环初始延迟（秒）
    pub cron_task_initial_delay_sec: u64,
    /// cron作业展开循环周期（秒）
    pub cron_task_period_sec: u64,
    /// 是否补偿生成上一个漏掉的触发点
    pub append_previous_task: bool,
    /// cron展开的未来时间窗口（分钟）
    pub generate_interval_min: i64,
    /// 待执行任务推送循环初始延迟（毫秒）
    pub waiting_task_initial_delay_ms: u64,
    /// 待执行任务推送循环基准周期（毫秒），实际周期为该值的20倍
    pub waiting_task_period_ms: u64,
    /// 单次推送扫描的任务上限
    pub waiting_task_scroll: u32,
    /// 积压回收准入权重，0-100
    pub task_overstock_weight: u32,
    /// 积压回收触发阈值（已发布任务数量）
    pub task_overstock_threshold: usize,
    /// 积压回收后保留的最新任务数量
    pub task_overstock_retain: usize,
    /// 心跳循环初始延迟（秒），过期任务清算循环共用
    pub heartbeat_initial_delay_sec: u64,
    /// 心跳循环周期（秒），过期任务清算循环共用
    pub heartbeat_period_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cluster: "default".to_string(),
            cron_task_initial_delay_sec: 5,
            cron_task_period_sec: 10,
            append_previous_task: false,
            generate_interval_min: 1,
            waiting_task_initial_delay_ms: 1000,
            waiting_task_period_ms: 50, // 实际周期 50 * 20 = 1000ms
            waiting_task_scroll: 100,
            task_overstock_weight: 30,
            task_overstock_threshold: 100,
            task_overstock_retain: 20,
            heartbeat_initial_delay_sec: 5,
            heartbeat_period_sec: 30,
        }
    }
}

impl ServerConfig {
    /// 校验配置合法性
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.cluster.is_empty() {
            return Err(SchedulerError::config_error("cluster 不能为空"));
        }
        if self.cron_task_period_sec == 0 {
            return Err(SchedulerError::config_error("cron_task_period_sec 必须大于0"));
        }
        if self.waiting_task_period_ms == 0 {
            return Err(SchedulerError::config_error(
                "waiting_task_period_ms 必须大于0",
            ));
        }
        if self.heartbeat_period_sec == 0 {
            return Err(SchedulerError::config_error("heartbeat_period_sec 必须大于0"));
        }
        if self.waiting_task_scroll == 0 {
            return Err(SchedulerError::config_error("waiting_task_scroll 必须大于0"));
        }
        if self.generate_interval_min <= 0 {
            return Err(SchedulerError::config_error(
                "generate_interval_min 必须大于0",
            ));
        }
        if self.task_overstock_weight > 100 {
            return Err(SchedulerError::config_error(
                "task_overstock_weight 取值范围为 0-100",
            ));
        }
        if self.task_overstock_retain > self.task_overstock_threshold {
            return Err(SchedulerError::config_error(
                "task_overstock_retain 不能大于 task_overstock_threshold",
            ));
        }
        Ok(())
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file(path: &str) -> SchedulerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::config_error(format!("读取配置文件 {path} 失败: {e}"))
        })?;
        let config: ServerConfig = toml::from_str(&content).map_err(|e| {
            SchedulerError::config_error(format!("解析配置文件 {path} 失败: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 推送循环的实际调度周期
    pub fn waiting_task_effective_period_ms(&self) -> u64 {
        self.waiting_task_period_ms * 20
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.task_overstock_threshold, 100);
        assert_eq!(config.task_overstock_retain, 20);
    }

    #[test]
    fn test_effective_period_applies_multiplier() {
        let config = ServerConfig {
            waiting_task_period_ms: 50,
            ..Default::default()
        };
        assert_eq!(config.waiting_task_effective_period_ms(), 1000);
    }

    #[test]
    fn test_validate_rejects_bad_weight() {
        let config = ServerConfig {
            task_overstock_weight: 101,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_retain_above_threshold() {
        let config = ServerConfig {
            task_overstock_threshold: 10,
            task_overstock_retain: 11,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ServerConfig =
            toml::from_str("cluster = \"trade\"\ntask_overstock_weight = 50\n").unwrap();
        assert_eq!(config.cluster, "trade");
        assert_eq!(config.task_overstock_weight, 50);
        assert_eq!(config.heartbeat_period_sec, 30);
    }
}
