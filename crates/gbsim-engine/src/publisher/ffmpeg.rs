// FFmpeg 推流：本地文件循环读取，rtp_mpegts 推到平台给出的地址

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::{ActiveStream, MediaPublisher, StreamRequest};
use crate::{Result, SimError};

/// 相对路径的视频源向上查找的层数
const SOURCE_SEARCH_DEPTH: usize = 5;

/// FFmpeg 推流参数
#[derive(Debug, Clone)]
pub struct FfmpegOptions {
    pub ffmpeg_path: String,

    /// 视频源文件
    pub source: PathBuf,

    /// 无限循环播放
    pub loop_source: bool,

    /// drawtext 字体文件，None 时不加水印
    pub watermark_font: Option<String>,

    /// 停止时等待退出的宽限期
    pub stop_grace: Duration,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            source: PathBuf::from("test.mp4"),
            loop_source: true,
            watermark_font: Some("/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc".to_string()),
            stop_grace: Duration::from_secs(5),
        }
    }
}

pub struct FfmpegPublisher {
    options: FfmpegOptions,
}

impl FfmpegPublisher {
    pub fn new(options: FfmpegOptions) -> Self {
        Self { options }
    }

    /// 查找视频源：绝对路径或当前目录存在则直接使用，否则逐级向上查找
    pub fn resolve_source(&self) -> Option<PathBuf> {
        let source = &self.options.source;
        if source.is_file() {
            return Some(source.clone());
        }
        if source.is_absolute() {
            return None;
        }

        let mut dir = std::env::current_dir().ok()?;
        for _ in 0..SOURCE_SEARCH_DEPTH {
            let candidate = dir.join(source);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// 生成 ffmpeg 参数
    pub fn build_args(&self, request: &StreamRequest, source: &Path) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if self.options.loop_source {
            args.extend(["-stream_loop", "-1"].map(String::from));
        }
        args.extend(["-re", "-i"].map(String::from));
        args.push(source.display().to_string());

        if let Some(font) = &self.options.watermark_font {
            args.push("-vf".to_string());
            args.push(drawtext_filter(font, &request.channel_name, &request.key.channel_id));
        }

        args.extend(
            [
                "-c:v", "libx264",
                "-preset", "veryfast",
                "-tune", "zerolatency",
                "-b:v", "2000k",
                "-maxrate", "2000k",
                "-bufsize", "4000k",
                "-g", "50",
                "-pix_fmt", "yuv420p",
                "-flags", "+global_header",
                "-c:a", "aac",
                "-b:a", "128k",
                "-f", "rtp_mpegts",
            ]
            .map(String::from),
        );
        args.push(format!("rtp://{}:{}", request.key.ip, request.key.port));
        args
    }
}

/// drawtext 水印（通道名优先，没有则用通道 ID）
fn drawtext_filter(font: &str, channel_name: &str, channel_id: &str) -> String {
    let text = if channel_name.is_empty() { channel_id } else { channel_name };
    let text = text.replace('\\', "").replace('\'', "").replace(':', "\\:");
    format!(
        "drawtext=fontfile={}:text='{}':fontcolor=white:fontsize=28:box=1:boxcolor=black@0.4:boxborderw=6:x=10:y=10",
        font, text
    )
}

#[async_trait]
impl MediaPublisher for FfmpegPublisher {
    async fn start(&self, request: &StreamRequest) -> Result<Box<dyn ActiveStream>> {
        let source = self.resolve_source().ok_or_else(|| {
            SimError::Publisher(format!("Source file not found: {}", self.options.source.display()))
        })?;

        let args = self.build_args(request, &source);
        tracing::debug!(target: "gbsim::ffmpeg", session = %request.key, args = ?args, "Spawning ffmpeg");

        let child = Command::new(&self.options.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(target: "gbsim::ffmpeg", session = %request.key, error = %e, "Failed to spawn ffmpeg");
                SimError::Publisher(format!("Failed to spawn ffmpeg: {}", e))
            })?;

        Ok(Box::new(FfmpegStream {
            label: request.key.to_string(),
            child: Mutex::new(child),
            grace: self.options.stop_grace,
        }))
    }
}

/// 运行中的 ffmpeg 进程
struct FfmpegStream {
    label: String,
    child: Mutex<Child>,
    grace: Duration,
}

#[async_trait]
impl ActiveStream for FfmpegStream {
    async fn stop(self: Box<Self>) {
        let FfmpegStream { label, child, grace } = *self;
        let mut child = child.into_inner();

        // ffmpeg 收到 q 会正常收尾退出
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.flush().await;
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(target: "gbsim::ffmpeg", session = %label, status = %status, "ffmpeg exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(target: "gbsim::ffmpeg", session = %label, error = %e, "Failed to wait for ffmpeg");
            }
            Err(_) => {
                tracing::warn!(target: "gbsim::ffmpeg", session = %label, "ffmpeg did not exit in time, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(target: "gbsim::ffmpeg", session = %label, error = %e, "Failed to kill ffmpeg");
                }
            }
        }
    }
}
