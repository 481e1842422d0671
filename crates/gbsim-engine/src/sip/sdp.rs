// GB28181 点播 SDP：解析平台 offer，生成设备 answer

/// 平台 offer 未带 m=video 端口时使用的默认端口
pub const DEFAULT_VIDEO_PORT: u16 = 5004;

/// 平台 INVITE 中携带的 SDP offer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpOffer {
    /// 推流目标地址（c=IN IP4）
    pub connection_ip: String,

    /// 推流目标端口（m=video）
    pub video_port: u16,

    pub audio_port: Option<u16>,

    /// SSRC（y=）
    pub ssrc: Option<String>,

    /// 流参数（f=）
    pub stream_param: Option<String>,
}

impl SdpOffer {
    /// 解析 offer，缺少 c= 时视为不可解析
    pub fn parse(body: &str) -> Option<Self> {
        let mut connection_ip = None;
        let mut video_port = None;
        let mut audio_port = None;
        let mut ssrc = None;
        let mut stream_param = None;

        for line in body.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("c=IN IP4 ") {
                if let Some(ip) = rest.split_whitespace().next() {
                    connection_ip = Some(ip.to_string());
                }
            } else if let Some(rest) = line.strip_prefix("m=video ") {
                video_port = rest.split_whitespace().next().and_then(|p| p.parse().ok());
            } else if let Some(rest) = line.strip_prefix("m=audio ") {
                audio_port = rest.split_whitespace().next().and_then(|p| p.parse().ok());
            } else if let Some(rest) = line.strip_prefix("y=") {
                let value = rest.trim();
                if !value.is_empty() {
                    ssrc = Some(value.to_string());
                }
            } else if let Some(rest) = line.strip_prefix("f=") {
                let value = rest.trim();
                if !value.is_empty() {
                    stream_param = Some(value.to_string());
                }
            }
        }

        Some(Self {
            connection_ip: connection_ip?,
            video_port: video_port.unwrap_or(DEFAULT_VIDEO_PORT),
            audio_port,
            ssrc,
            stream_param,
        })
    }
}

/// 平台未提供 y= 时生成 SSRC（毫秒时间戳取模，10 位补零）
pub fn generate_ssrc() -> String {
    let millis = chrono::Utc::now().timestamp_millis().rem_euclid(100_000_000);
    format!("{:010}", millis)
}

/// 生成 200 OK 中的 SDP answer（发送端，PS/90000，sendonly）
///
/// 媒体端口写 0，实际发送端口由推流进程决定。
pub fn build_answer(device_id: &str, contact_ip: &str, ssrc: &str, stream_param: Option<&str>) -> String {
    let mut sdp = String::new();
    sdp.push_str("v=0\r\n");
    sdp.push_str(&format!("o={} 0 0 IN IP4 {}\r\n", device_id, contact_ip));
    sdp.push_str("s=Play\r\n");
    sdp.push_str(&format!("c=IN IP4 {}\r\n", contact_ip));
    sdp.push_str("t=0 0\r\n");
    sdp.push_str("m=video 0 RTP/AVP 96\r\n");
    sdp.push_str("a=rtpmap:96 PS/90000\r\n");
    sdp.push_str("a=sendonly\r\n");
    sdp.push_str(&format!("y={}\r\n", ssrc));
    if let Some(f) = stream_param.filter(|f| !f.is_empty()) {
        sdp.push_str(&format!("f={}\r\n", f));
    }
    sdp
}
