// 进程级设备状态看板，供运维输出使用
// 唯一跨设备共享的结构

use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::device::RegistrationState;

/// 单个设备的状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub device_id: String,
    pub name: String,
    pub local_port: u16,
    pub contact_ip: String,
    pub state: RegistrationState,
    pub active_sessions: usize,
    pub heartbeats_sent: u64,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// 汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub devices: usize,
    pub registered: usize,
    pub active_sessions: usize,
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "devices={} registered={} sessions={}",
            self.devices, self.registered, self.active_sessions
        )
    }
}

#[derive(Debug, Default)]
pub struct StatusBoard {
    devices: DashMap<String, DeviceStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, status: DeviceStatus) {
        self.devices.insert(status.device_id.clone(), status);
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceStatus> {
        self.devices.get(device_id).map(|s| s.value().clone())
    }

    pub fn remove(&self, device_id: &str) {
        self.devices.remove(device_id);
    }

    /// 按设备 ID 排序的快照
    pub fn snapshot(&self) -> Vec<DeviceStatus> {
        let mut all: Vec<DeviceStatus> = self.devices.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        all
    }

    pub fn summary(&self) -> StatusSummary {
        self.devices.iter().fold(StatusSummary::default(), |mut acc, e| {
            acc.devices += 1;
            if e.state == RegistrationState::Registered {
                acc.registered += 1;
            }
            acc.active_sessions += e.active_sessions;
            acc
        })
    }
}
