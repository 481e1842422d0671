use anyhow::{anyhow, Context, Result};
use config::{Config, File, FileFormat};
use std::path::{Path, PathBuf};

use crate::SimulatorConfig;

/// 配置文件名
pub const CONFIG_FILE: &str = "gbsim.toml";

/// 配置加载器
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// 创建配置加载器
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// 加载模拟器配置
    pub fn load(&self) -> Result<SimulatorConfig> {
        let config_path = self.config_path();

        if !config_path.exists() {
            // 配置文件不存在时使用默认配置
            return Ok(SimulatorConfig::default());
        }

        let config = Config::builder()
            .add_source(File::new(
                config_path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ))
            .build()
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        config
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))
    }

    /// 加载并验证
    pub fn load_validated(&self) -> Result<SimulatorConfig> {
        let config = self.load()?;
        validate(&config)?;
        Ok(config)
    }
}

/// 验证配置
pub fn validate(config: &SimulatorConfig) -> Result<()> {
    if config.server.ip.trim().is_empty() {
        return Err(anyhow!("server.ip must not be empty"));
    }
    if config.server.port == 0 {
        return Err(anyhow!("server.port must be greater than 0"));
    }

    if config.fleet.device_count == 0 {
        return Err(anyhow!("fleet.device_count must be greater than 0"));
    }
    if config.fleet.channel_count == 0 {
        return Err(anyhow!("fleet.channel_count must be greater than 0"));
    }
    if config.fleet.base_port == 0 {
        return Err(anyhow!("fleet.base_port must be greater than 0"));
    }
    if config.last_port().is_none() {
        return Err(anyhow!(
            "fleet.base_port ({}) + device_count ({}) exceeds the UDP port range",
            config.fleet.base_port,
            config.fleet.device_count
        ));
    }

    let timers = &config.timers;
    if timers.register_expires == 0 || timers.heartbeat_interval == 0 || timers.retry_interval == 0 {
        return Err(anyhow!("timer intervals must be greater than 0"));
    }
    // Expires 头是 32 位无符号数
    if u32::try_from(timers.register_expires).is_err() {
        return Err(anyhow!(
            "timers.register_expires ({}) exceeds {}",
            timers.register_expires,
            u32::MAX
        ));
    }
    if timers.recv_timeout_ms == 0 {
        return Err(anyhow!("timers.recv_timeout_ms must be greater than 0"));
    }

    if config.media.ffmpeg_path.trim().is_empty() {
        return Err(anyhow!("media.ffmpeg_path must not be empty"));
    }

    Ok(())
}
