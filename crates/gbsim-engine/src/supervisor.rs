// 模拟器：批量生成设备配置，每个设备一个任务，统一启停

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::device::{run_device, DeviceConfig, DeviceDeps, DeviceTimers};
use crate::status::StatusBoard;
use crate::Result;

/// 批量设备规划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetPlan {
    pub device_count: usize,
    pub channel_count: usize,
    /// 设备 ID 前缀，设备 N 的 ID 为前缀 + N（4 位补零）
    pub base_device_id: String,
    /// 设备 N 绑定 base_port + N - 1
    pub base_port: u16,
    pub local_ip: String,
    pub server_ip: String,
    pub server_port: u16,
    pub password: String,
    pub realm: String,
    pub name_prefix: String,
    pub timers: DeviceTimers,
}

impl Default for FleetPlan {
    fn default() -> Self {
        Self {
            device_count: 3,
            channel_count: 1,
            base_device_id: "3402000000132000".to_string(),
            base_port: 15060,
            local_ip: "127.0.0.1".to_string(),
            server_ip: "192.168.32.84".to_string(),
            server_port: 8809,
            password: "123456".to_string(),
            realm: crate::device::config::DEFAULT_REALM.to_string(),
            name_prefix: "模拟设备".to_string(),
            timers: DeviceTimers::default(),
        }
    }
}

impl FleetPlan {
    /// 展开为每个设备的配置
    pub fn devices(&self) -> Vec<DeviceConfig> {
        (0..self.device_count)
            .map(|i| DeviceConfig {
                device_id: format!("{}{:04}", self.base_device_id, i + 1),
                name: format!("{}{}", self.name_prefix, i + 1),
                local_ip: self.local_ip.clone(),
                local_port: self.base_port.saturating_add(i as u16),
                server_ip: self.server_ip.clone(),
                server_port: self.server_port,
                password: self.password.clone(),
                realm: self.realm.clone(),
                channel_count: self.channel_count,
                timers: self.timers.clone(),
            })
            .collect()
    }
}

/// 模拟器
pub struct Simulator {
    deps: DeviceDeps,
    stagger: Duration,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<Result<()>>)>,
}

impl Simulator {
    pub fn new(deps: DeviceDeps, stagger: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            deps,
            stagger,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn status(&self) -> &Arc<StatusBoard> {
        &self.deps.status
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// 通知所有设备退出
    pub fn trigger_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// 启动单个设备任务
    pub fn spawn_device(&mut self, config: DeviceConfig) {
        let device_id = config.device_id.clone();
        let deps = self.deps.clone();
        let rx = self.shutdown_tx.subscribe();
        let id = device_id.clone();

        let handle = tokio::spawn(async move {
            let result = run_device(config, deps, rx).await;
            if let Err(e) = &result {
                tracing::error!(target: "gbsim::supervisor", device_id = %id, error = %e, "Device exited with error");
            }
            result
        });
        self.tasks.push((device_id, handle));
    }

    /// 依次启动设备，相邻设备间隔 stagger；关闭后不再启动新设备
    pub async fn start_all(&mut self, configs: Vec<DeviceConfig>) -> usize {
        let total = configs.len();
        let mut started = 0;
        for (i, config) in configs.into_iter().enumerate() {
            if self.is_shutting_down() {
                break;
            }
            tracing::info!(target: "gbsim::supervisor", device_id = %config.device_id, index = i + 1, total, "Starting device");
            self.spawn_device(config);
            started += 1;
            if i + 1 < total && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
        }
        started
    }

    /// 仍在运行的设备数
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    /// 关闭全部设备，超过宽限期仍未退出的任务直接中止
    pub async fn stop_all(&mut self, grace: Duration) {
        self.trigger_shutdown();
        let deadline = tokio::time::Instant::now() + grace;

        for (device_id, mut handle) in self.tasks.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(target: "gbsim::supervisor", device_id = %device_id, error = %e, "Device task panicked");
                }
                Err(_) => {
                    tracing::warn!(target: "gbsim::supervisor", device_id = %device_id, "Device did not stop in time, aborting");
                    handle.abort();
                }
            }
        }
        tracing::info!(target: "gbsim::supervisor", summary = %self.deps.status.summary(), "All devices stopped");
    }
}
