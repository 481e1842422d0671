// 单个模拟设备的配置

use std::time::Duration;

/// 默认鉴权域
pub const DEFAULT_REALM: &str = "3402000000";

/// 注册 / 心跳定时参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTimers {
    /// 注册有效期
    pub register_expires: Duration,

    /// 心跳间隔
    pub heartbeat_interval: Duration,

    /// 注册重试间隔
    pub retry_interval: Duration,

    /// 接收超时，同时作为定时检查的节拍
    pub recv_timeout: Duration,
}

impl Default for DeviceTimers {
    fn default() -> Self {
        Self {
            register_expires: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(30),
            retry_interval: Duration::from_secs(10),
            recv_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub device_id: String,
    pub name: String,
    pub local_ip: String,
    pub local_port: u16,
    pub server_ip: String,
    pub server_port: u16,
    pub password: String,
    pub realm: String,
    pub channel_count: usize,
    pub timers: DeviceTimers,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: "34020000001320000001".to_string(),
            name: "模拟设备1".to_string(),
            local_ip: "127.0.0.1".to_string(),
            local_port: 15060,
            server_ip: "127.0.0.1".to_string(),
            server_port: 5060,
            password: "123456".to_string(),
            realm: DEFAULT_REALM.to_string(),
            channel_count: 1,
            timers: DeviceTimers::default(),
        }
    }
}

impl DeviceConfig {
    pub fn server_is_local(&self) -> bool {
        self.server_ip == "127.0.0.1" || self.server_ip.eq_ignore_ascii_case("localhost")
    }

    /// 绑定地址：本地地址为回环而平台在远端时绑定所有网卡，否则绑定本地地址
    pub fn bind_ip(&self) -> &str {
        if self.local_ip == "127.0.0.1" && !self.server_is_local() {
            "0.0.0.0"
        } else {
            &self.local_ip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_policy() {
        let mut cfg = DeviceConfig::default();
        assert_eq!(cfg.bind_ip(), "127.0.0.1");

        cfg.server_ip = "localhost".to_string();
        assert_eq!(cfg.bind_ip(), "127.0.0.1");

        cfg.server_ip = "192.168.32.84".to_string();
        assert_eq!(cfg.bind_ip(), "0.0.0.0");

        cfg.local_ip = "192.168.32.10".to_string();
        assert_eq!(cfg.bind_ip(), "192.168.32.10");
    }

    #[test]
    fn test_default_timers() {
        let timers = DeviceTimers::default();
        assert_eq!(timers.register_expires, Duration::from_secs(3600));
        assert_eq!(timers.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(timers.retry_interval, Duration::from_secs(10));
    }
}
