// 模拟设备：注册状态机 + 信令处理 + 运行循环

use std::fmt;
use std::sync::Arc;

use crate::exchange::ExchangeLog;
use crate::publisher::MediaPublisher;
use crate::status::StatusBoard;

pub mod config;
pub mod engine;
pub mod runtime;

pub use config::{DeviceConfig, DeviceTimers};
pub use engine::DeviceEngine;
pub use runtime::run_device;

/// 注册状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationState::Unregistered => write!(f, "unregistered"),
            RegistrationState::Registering => write!(f, "registering"),
            RegistrationState::Registered => write!(f, "registered"),
        }
    }
}

/// 设备依赖的外部能力
#[derive(Clone)]
pub struct DeviceDeps {
    pub publisher: Arc<dyn MediaPublisher>,
    pub exchange: Arc<dyn ExchangeLog>,
    pub status: Arc<StatusBoard>,
}
