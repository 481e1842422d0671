use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gbsim_config::{ConfigLoader, SimulatorConfig};
use gbsim_engine::{
    DeviceDeps, DeviceTimers, ExchangeLog, FfmpegOptions, FfmpegPublisher, FleetPlan, Simulator,
    StatusBoard,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod console;
mod signal;

use console::{ConsoleExchangeLog, ExchangeMode};
use signal::SignalHandler;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// 配置目录（读取其中的 gbsim.toml）
    #[arg(long, default_value = "./config")]
    config_dir: String,

    #[arg(long)]
    server_ip: Option<String>,

    #[arg(long)]
    server_port: Option<u16>,

    #[arg(long)]
    password: Option<String>,

    /// 模拟设备数量
    #[arg(long)]
    devices: Option<usize>,

    /// 每个设备的通道数量
    #[arg(long)]
    channels: Option<usize>,

    #[arg(long)]
    local_ip: Option<String>,

    /// RUST_LOG 未设置时使用的日志级别
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 控制台报文打印范围
    #[arg(long, value_enum, default_value_t = ExchangeMode::Catalog)]
    exchange_log: ExchangeMode,

    /// 状态汇总间隔（秒），0 表示不输出
    #[arg(long, default_value_t = 60)]
    status_interval: u64,

    /// 打印生效配置后退出
    #[arg(long)]
    print_config: bool,
}

/// 命令行参数覆盖配置文件
fn apply_overrides(config: &mut SimulatorConfig, args: &Args) {
    if let Some(ip) = &args.server_ip {
        config.server.ip = ip.clone();
    }
    if let Some(port) = args.server_port {
        config.server.port = port;
    }
    if let Some(password) = &args.password {
        config.fleet.password = password.clone();
    }
    if let Some(devices) = args.devices {
        config.fleet.device_count = devices;
    }
    if let Some(channels) = args.channels {
        config.fleet.channel_count = channels;
    }
    if let Some(local_ip) = &args.local_ip {
        config.fleet.local_ip = local_ip.clone();
    }
}

fn fleet_plan(config: &SimulatorConfig) -> FleetPlan {
    FleetPlan {
        device_count: config.fleet.device_count,
        channel_count: config.fleet.channel_count,
        base_device_id: config.fleet.base_device_id.clone(),
        base_port: config.fleet.base_port,
        local_ip: config.fleet.local_ip.clone(),
        server_ip: config.server.ip.clone(),
        server_port: config.server.port,
        password: config.fleet.password.clone(),
        realm: config.server.realm.clone(),
        name_prefix: config.fleet.name_prefix.clone(),
        timers: DeviceTimers {
            register_expires: Duration::from_secs(config.timers.register_expires),
            heartbeat_interval: Duration::from_secs(config.timers.heartbeat_interval),
            retry_interval: Duration::from_secs(config.timers.retry_interval),
            recv_timeout: Duration::from_millis(config.timers.recv_timeout_ms),
        },
    }
}

fn ffmpeg_options(config: &SimulatorConfig) -> FfmpegOptions {
    let defaults = FfmpegOptions::default();
    // 显式配置为空字符串时关闭水印
    let watermark_font = match &config.media.watermark_font {
        Some(font) if font.trim().is_empty() => None,
        Some(font) => Some(font.clone()),
        None => defaults.watermark_font,
    };
    FfmpegOptions {
        ffmpeg_path: config.media.ffmpeg_path.clone(),
        source: config.media.source.clone(),
        loop_source: config.media.loop_source,
        watermark_font,
        stop_grace: Duration::from_secs(config.media.stop_grace_secs),
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 加载配置
    let loader = ConfigLoader::new(&args.config_dir);
    let mut config = loader
        .load()
        .with_context(|| format!("Failed to load configuration from {}", args.config_dir))?;
    apply_overrides(&mut config, &args);
    gbsim_config::validate(&config)?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&args.log_level);

    let plan = fleet_plan(&config);
    let options = ffmpeg_options(&config);
    let publisher = FfmpegPublisher::new(options.clone());
    if publisher.resolve_source().is_none() {
        tracing::warn!(target: "gbsimd", source = %options.source.display(), "Video source not found, INVITE will fail until it exists");
    }

    let exchange: Arc<dyn ExchangeLog> = Arc::new(ConsoleExchangeLog::new(args.exchange_log));
    let status = Arc::new(StatusBoard::new());
    let deps = DeviceDeps {
        publisher: Arc::new(publisher),
        exchange,
        status: status.clone(),
    };
    let mut simulator = Simulator::new(deps, Duration::from_millis(config.fleet.start_stagger_ms));

    tracing::info!(
        target: "gbsimd",
        server = %format!("{}:{}", plan.server_ip, plan.server_port),
        devices = plan.device_count,
        channels = plan.channel_count,
        "GB28181 simulator starting"
    );

    // 信号监听
    let signals = Arc::new(SignalHandler::new());
    let mut shutdown_rx = signals.subscribe();
    let listener = {
        let signals = signals.clone();
        tokio::spawn(async move {
            if let Err(e) = signals.wait().await {
                tracing::error!(target: "gbsimd", error = %e, "Failed to install signal handlers");
            }
        })
    };

    // 启动期间收到信号则停止启动剩余设备
    let started = tokio::select! {
        started = simulator.start_all(plan.devices()) => Some(started),
        _ = shutdown_rx.recv() => None,
    };

    if let Some(started) = started {
        tracing::info!(target: "gbsimd", started, "All devices launched");

        let report_every = (args.status_interval > 0).then(|| Duration::from_secs(args.status_interval));
        let mut liveness = tokio::time::interval(Duration::from_secs(1));
        let mut last_report = tokio::time::Instant::now();

        loop {
            tokio::select! {
                signal = shutdown_rx.recv() => {
                    tracing::info!(target: "gbsimd", signal = ?signal.ok(), "Shutdown requested");
                    break;
                }
                _ = liveness.tick() => {
                    if let Some(every) = report_every {
                        if last_report.elapsed() >= every {
                            last_report = tokio::time::Instant::now();
                            tracing::info!(target: "gbsimd", summary = %status.summary(), running = simulator.running(), "Status");
                            for device in status.snapshot() {
                                tracing::debug!(
                                    target: "gbsimd",
                                    device_id = %device.device_id,
                                    state = %device.state,
                                    sessions = device.active_sessions,
                                    heartbeats = device.heartbeats_sent,
                                    "Device status"
                                );
                            }
                        }
                    }
                    if simulator.running() == 0 {
                        tracing::warn!(target: "gbsimd", "All devices exited");
                        signals.trigger_shutdown();
                    }
                }
            }
        }
    } else {
        tracing::info!(target: "gbsimd", "Shutdown requested during startup");
    }

    let grace = options.stop_grace + Duration::from_secs(2);
    simulator.stop_all(grace).await;
    listener.abort();

    tracing::info!(target: "gbsimd", summary = %status.summary(), "GB28181 simulator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_overrides_take_precedence() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join(gbsim_config::CONFIG_FILE),
            "[server]\nip = \"10.0.0.1\"\n\n[fleet]\ndevice_count = 5\n",
        )
        .unwrap();
        let dir = temp_dir.path().to_string_lossy().to_string();

        let args = Args::parse_from([
            "gbsimd",
            "--config-dir",
            dir.as_str(),
            "--server-ip",
            "10.9.9.9",
            "--channels",
            "4",
            "--exchange-log",
            "off",
        ]);
        let mut config = ConfigLoader::new(&args.config_dir).load().unwrap();
        apply_overrides(&mut config, &args);

        assert_eq!(config.server.ip, "10.9.9.9");
        assert_eq!(config.fleet.device_count, 5);
        assert_eq!(config.fleet.channel_count, 4);
        assert_eq!(args.exchange_log, ExchangeMode::Off);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_fleet_plan_from_config() {
        let mut config = SimulatorConfig::default();
        config.timers.recv_timeout_ms = 250;
        let plan = fleet_plan(&config);

        assert_eq!(plan.server_ip, "192.168.32.84");
        assert_eq!(plan.server_port, 8809);
        assert_eq!(plan.timers.recv_timeout, Duration::from_millis(250));
        let devices = plan.devices();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].device_id, "34020000001320000001");
        // 本地回环 + 远端平台时绑定所有网卡
        assert_eq!(devices[0].bind_ip(), "0.0.0.0");
    }

    #[test]
    fn test_watermark_font_selection() {
        let mut config = SimulatorConfig::default();
        assert!(ffmpeg_options(&config).watermark_font.is_some());

        config.media.watermark_font = Some(String::new());
        assert!(ffmpeg_options(&config).watermark_font.is_none());

        config.media.watermark_font = Some("/fonts/a.ttf".to_string());
        assert_eq!(ffmpeg_options(&config).watermark_font.as_deref(), Some("/fonts/a.ttf"));
    }
}
