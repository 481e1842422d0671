use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 模拟器配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub server: ServerSection,
    pub fleet: FleetSection,
    pub timers: TimerSection,
    pub media: MediaSection,
}

/// 上级平台
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    /// 平台地址，可以是 IP 或主机名
    pub ip: String,
    pub port: u16,
    /// 鉴权域
    pub realm: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            ip: "192.168.32.84".to_string(),
            port: 8809,
            realm: "3402000000".to_string(),
        }
    }
}

/// 批量设备
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetSection {
    pub device_count: usize,
    pub channel_count: usize,
    /// 设备 ID 前缀，第 N 个设备追加 4 位序号
    pub base_device_id: String,
    /// 第 N 个设备绑定 base_port + N - 1
    pub base_port: u16,
    pub local_ip: String,
    pub password: String,
    pub name_prefix: String,
    /// 相邻设备启动间隔（毫秒）
    pub start_stagger_ms: u64,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            device_count: 3,
            channel_count: 1,
            base_device_id: "3402000000132000".to_string(),
            base_port: 15060,
            local_ip: "127.0.0.1".to_string(),
            password: "123456".to_string(),
            name_prefix: "模拟设备".to_string(),
            start_stagger_ms: 500,
        }
    }
}

/// 定时参数（秒，recv_timeout_ms 为毫秒）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimerSection {
    pub register_expires: u64,
    pub heartbeat_interval: u64,
    pub retry_interval: u64,
    pub recv_timeout_ms: u64,
}

impl Default for TimerSection {
    fn default() -> Self {
        Self {
            register_expires: 3600,
            heartbeat_interval: 30,
            retry_interval: 10,
            recv_timeout_ms: 1000,
        }
    }
}

/// 推流
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaSection {
    pub ffmpeg_path: String,
    /// 视频源文件，相对路径会向上查找
    pub source: PathBuf,
    pub loop_source: bool,
    /// 水印字体，不设置时使用推流器默认字体
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_font: Option<String>,
    pub stop_grace_secs: u64,
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            source: PathBuf::from("test.mp4"),
            loop_source: true,
            watermark_font: None,
            stop_grace_secs: 5,
        }
    }
}

impl SimulatorConfig {
    /// 输出为 TOML 文本
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 最后一个设备的端口，溢出时返回 None
    pub fn last_port(&self) -> Option<u16> {
        let offset = self.fleet.device_count.checked_sub(1)?;
        let offset = u16::try_from(offset).ok()?;
        self.fleet.base_port.checked_add(offset)
    }
}
