use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};

use cronmaster_core::{SchedulerResult, ServerConfig};
use cronmaster_domain::coordination::{ChildChangeEvent, CoordinationRegistry};
use cronmaster_domain::entities::NodeServer;
use cronmaster_domain::paths;
use cronmaster_domain::repositories::ScheduleRepository;

use crate::context::ServerContext;
use crate::dispatch::WaitingTaskDispatcher;
use crate::expire::ExpireTaskReconciler;
use crate::generator::CronTaskGenerator;
use crate::heartbeat::HeartbeatMonitor;
use crate::recovery::OverstockRecovery;

/// 调度服务端
///
/// 启动时向协调服务注册本机临时节点并订阅选举根节点，之后运行
/// 四个周期循环：cron作业展开、待执行任务推送、过期任务对账
/// （以上三个仅master执行，按当前结论逐轮判断），以及所有节点
/// 都执行的心跳巡检。停止通过广播通知各循环退出。
pub struct SchedulerServer {
    config: ServerConfig,
    context: Arc<ServerContext>,
    registry: Arc<dyn CoordinationRegistry>,
    repository: Arc<dyn ScheduleRepository>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerServer {
    /// 以本机 hostname_pid 作为节点标识创建服务
    pub fn new(
        config: ServerConfig,
        registry: Arc<dyn CoordinationRegistry>,
        repository: Arc<dyn ScheduleRepository>,
    ) -> SchedulerResult<Self> {
        let identification = NodeServer::local_identification();
        Self::with_identification(config, registry, repository, identification)
    }

    pub fn with_identification(
        config: ServerConfig,
        registry: Arc<dyn CoordinationRegistry>,
        repository: Arc<dyn ScheduleRepository>,
        identification: String,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        let context = Arc::new(ServerContext::new(
            config.cluster.clone(),
            identification,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            context,
            registry,
            repository,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn context(&self) -> Arc<ServerContext> {
        self.context.clone()
    }

    pub async fn is_master(&self) -> bool {
        self.context.is_master().await
    }

    /// 注册并接入选举
    ///
    /// 必须先订阅再创建本机临时节点，否则会漏掉自己上线这次变化。
    async fn bootstrap_election(
        &self,
    ) -> SchedulerResult<tokio::sync::mpsc::UnboundedReceiver<ChildChangeEvent>> {
        let root = paths::server_node_path(self.context.cluster());
        if !self.registry.exists(&root).await? {
            self.registry.create_persistent(&root).await?;
        }
        let events = self.registry.subscribe_children(&root).await?;
        self.registry
            .create_ephemeral(&self.context.local_node_path(), None)
            .await?;
        // 订阅建立前已存活的节点不会产生事件，先全量推算一次
        let children = self.registry.children(&root).await?;
        self.context.elector().elect(&children).await;
        info!(
            "节点 {} 已注册到 {}",
            self.context.local_identification(),
            root
        );
        Ok(events)
    }

    /// 启动选举监听与全部周期循环
    pub async fn start(&self) -> SchedulerResult<()> {
        let mut events = self.bootstrap_election().await?;
        let mut handles = Vec::new();

        // 选举监听：每次存活集合变化都重新推算master
        {
            let context = self.context.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Some(event) => context.elector().elect(&event.children).await,
                            None => {
                                warn!("选举watch通道已关闭");
                                break;
                            }
                        },
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }));
        }

        // cron作业展开循环
        {
            let generator = CronTaskGenerator::new(
                self.context.clone(),
                self.repository.clone(),
                self.config.append_previous_task,
                self.config.generate_interval_min,
            );
            let context = self.context.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let start = Instant::now()
                + Duration::from_secs(self.config.cron_task_initial_delay_sec);
            let period = Duration::from_secs(self.config.cron_task_period_sec);
            handles.push(tokio::spawn(async move {
                let mut ticker = interval_at(start, period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if !context.is_master().await {
                                continue;
                            }
                            if let Err(e) = generator.generate_once().await {
                                error!("cron作业展开循环出错: {}", e);
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }));
        }

        // 待执行任务推送循环
        {
            let recovery = OverstockRecovery::new(
                self.context.clone(),
                self.registry.clone(),
                self.repository.clone(),
                self.config.task_overstock_weight,
                self.config.task_overstock_threshold,
                self.config.task_overstock_retain,
            );
            let dispatcher = WaitingTaskDispatcher::new(
                self.context.clone(),
                self.repository.clone(),
                recovery,
                self.config.waiting_task_scroll,
            );
            let context = self.context.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let start = Instant::now()
                + Duration::from_millis(self.config.waiting_task_initial_delay_ms);
            let period = Duration::from_millis(self.config.waiting_task_effective_period_ms());
            handles.push(tokio::spawn(async move {
                let mut ticker = interval_at(start, period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if !context.is_master().await {
                                continue;
                            }
                            if let Err(e) = dispatcher.push_once().await {
                                error!("待执行任务推送循环出错: {}", e);
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }));
        }

        // 过期任务对账循环，与心跳共用周期配置
        {
            let reconciler =
                ExpireTaskReconciler::new(self.context.clone(), self.repository.clone());
            let context = self.context.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let start = Instant::now()
                + Duration::from_secs(self.config.heartbeat_initial_delay_sec);
            let period = Duration::from_secs(self.config.heartbeat_period_sec);
            handles.push(tokio::spawn(async move {
                let mut ticker = interval_at(start, period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if !context.is_master().await {
                                continue;
                            }
                            if let Err(e) = reconciler.reconcile_once().await {
                                error!("过期任务对账循环出错: {}", e);
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }));
        }

        // 心跳巡检循环，所有节点都执行
        {
            let monitor = HeartbeatMonitor::new(
                self.context.clone(),
                self.registry.clone(),
                self.repository.clone(),
            );
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let start = Instant::now()
                + Duration::from_secs(self.config.heartbeat_initial_delay_sec);
            let period = Duration::from_secs(self.config.heartbeat_period_sec);
            handles.push(tokio::spawn(async move {
                let mut ticker = interval_at(start, period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => monitor.beat_once().await,
                        _ = shutdown_rx.recv() => break,
                    }
                }
            }));
        }

        self.handles.lock().await.extend(handles);
        info!("调度服务已启动，节点 {}", self.context.local_identification());
        Ok(())
    }

    /// 通知全部循环退出并等待结束
    pub async fn stop(&self) {
        info!("调度服务停止中");
        let _ = self.shutdown_tx.send(());
        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台任务退出异常: {}", e);
            }
        }
        info!("调度服务已停止");
    }
}
