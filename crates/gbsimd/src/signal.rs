use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

/// 关闭信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM
    Term,

    /// SIGINT / Ctrl+C
    Interrupt,

    /// 手动触发
    Manual,
}

/// 信号处理器
pub struct SignalHandler {
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
}

impl SignalHandler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self { shutdown_tx }
    }

    /// 等待系统信号并广播给订阅者；手动触发时直接返回
    #[cfg(unix)]
    pub async fn wait(&self) -> std::io::Result<ShutdownSignal> {
        use signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut manual = self.shutdown_tx.subscribe();

        let received = tokio::select! {
            _ = sigterm.recv() => {
                info!(target: "gbsimd", "Received SIGTERM");
                ShutdownSignal::Term
            }
            _ = sigint.recv() => {
                info!(target: "gbsimd", "Received SIGINT");
                ShutdownSignal::Interrupt
            }
            relayed = manual.recv() => return Ok(relayed.unwrap_or(ShutdownSignal::Manual)),
        };
        let _ = self.shutdown_tx.send(received);
        Ok(received)
    }

    #[cfg(not(unix))]
    pub async fn wait(&self) -> std::io::Result<ShutdownSignal> {
        let mut manual = self.shutdown_tx.subscribe();

        let received = tokio::select! {
            ctrl_c = signal::ctrl_c() => {
                ctrl_c?;
                info!(target: "gbsimd", "Received Ctrl+C");
                ShutdownSignal::Interrupt
            }
            relayed = manual.recv() => return Ok(relayed.unwrap_or(ShutdownSignal::Manual)),
        };
        let _ = self.shutdown_tx.send(received);
        Ok(received)
    }

    /// 手动触发关闭
    pub fn trigger_shutdown(&self) {
        info!(target: "gbsimd", "Manual shutdown triggered");
        let _ = self.shutdown_tx.send(ShutdownSignal::Manual);
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
