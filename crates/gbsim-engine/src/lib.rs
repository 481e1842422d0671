// GB28181 设备模拟引擎
// 每个模拟设备独立完成注册、心跳、目录、点播与挂断

pub mod channel;
pub mod device;
pub mod error;
pub mod exchange;
pub mod publisher;
pub mod session;
pub mod sip;
pub mod status;
pub mod supervisor;
pub mod transport;

pub use channel::Channel;
pub use device::{DeviceConfig, DeviceDeps, DeviceEngine, DeviceTimers, RegistrationState};
pub use error::{Result, SimError};
pub use exchange::{Direction, ExchangeLog, NullExchangeLog};
pub use publisher::{ActiveStream, FfmpegOptions, FfmpegPublisher, MediaPublisher, StreamRequest};
pub use session::{SessionKey, SessionTracker};
pub use status::{DeviceStatus, StatusBoard, StatusSummary};
pub use supervisor::{FleetPlan, Simulator};
pub use transport::Transport;
