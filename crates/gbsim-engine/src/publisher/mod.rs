// 媒体推流抽象
// 设备只关心推流生命周期，具体推流方式由 MediaPublisher 实现

use async_trait::async_trait;

use crate::session::SessionKey;
use crate::Result;

pub mod ffmpeg;
pub mod registry;

/// 推流请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// 会话键，包含通道和推流目标
    pub key: SessionKey,

    /// 通道名称（用于水印）
    pub channel_name: String,

    pub ssrc: String,
}

/// 推流器 trait
#[async_trait]
pub trait MediaPublisher: Send + Sync {
    /// 开始推流，返回可停止的句柄
    async fn start(&self, request: &StreamRequest) -> Result<Box<dyn ActiveStream>>;
}

/// 正在进行的推流
#[async_trait]
pub trait ActiveStream: Send + Sync {
    /// 停止推流，超过宽限期后强制结束
    async fn stop(self: Box<Self>);
}

pub use ffmpeg::{FfmpegOptions, FfmpegPublisher};
pub use registry::StreamRegistry;
