#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gbsim_engine::sip::SipMessage;
use gbsim_engine::{
    ActiveStream, DeviceConfig, DeviceDeps, DeviceEngine, Direction, ExchangeLog, MediaPublisher,
    SimError, StatusBoard, StreamRequest, Transport,
};

pub const SERVER: &str = "10.0.0.1:5060";
pub const DEVICE_ID: &str = "34020000001320000001";

pub fn server_addr() -> SocketAddr {
    SERVER.parse().unwrap()
}

/// 记录发送的报文
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(SocketAddr, String)>>,
}

impl RecordingTransport {
    pub fn take(&self) -> Vec<(SocketAddr, SipMessage)> {
        self.sent
            .lock()
            .unwrap()
            .drain(..)
            .map(|(addr, text)| (addr, SipMessage::parse(&text).unwrap()))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_to(&self, data: &[u8], target: SocketAddr) -> std::io::Result<usize> {
        self.sent
            .lock()
            .unwrap()
            .push((target, String::from_utf8_lossy(data).into_owned()));
        Ok(data.len())
    }
}

/// 记录推流启停
#[derive(Default)]
pub struct RecordingPublisher {
    pub started: Mutex<Vec<StreamRequest>>,
    pub stopped: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
    /// 成功启动这么多次之后开始失败
    pub fail_after: Option<usize>,
}

impl RecordingPublisher {
    pub fn started(&self) -> Vec<StreamRequest> {
        self.started.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }
}

struct RecordingStream {
    label: String,
    stopped: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ActiveStream for RecordingStream {
    async fn stop(self: Box<Self>) {
        self.stopped.lock().unwrap().push(self.label.clone());
    }
}

#[async_trait]
impl MediaPublisher for RecordingPublisher {
    async fn start(&self, request: &StreamRequest) -> gbsim_engine::Result<Box<dyn ActiveStream>> {
        let mut started = self.started.lock().unwrap();
        if self.fail || self.fail_after.is_some_and(|n| started.len() >= n) {
            return Err(SimError::Publisher("source missing".to_string()));
        }
        started.push(request.clone());
        Ok(Box::new(RecordingStream {
            label: request.key.to_string(),
            stopped: self.stopped.clone(),
        }))
    }
}

/// 记录报文观察回调
#[derive(Default)]
pub struct RecordingExchange {
    pub entries: Mutex<Vec<(String, Direction, SocketAddr)>>,
}

impl ExchangeLog for RecordingExchange {
    fn log_exchange(&self, device_id: &str, direction: Direction, _text: &str, peer: SocketAddr) {
        self.entries
            .lock()
            .unwrap()
            .push((device_id.to_string(), direction, peer));
    }
}

pub struct Harness {
    pub engine: DeviceEngine,
    pub transport: RecordingTransport,
    pub publisher: Arc<RecordingPublisher>,
    pub exchange: Arc<RecordingExchange>,
    pub status: Arc<StatusBoard>,
}

pub fn device_config(channel_count: usize) -> DeviceConfig {
    DeviceConfig {
        device_id: DEVICE_ID.to_string(),
        name: "模拟设备1".to_string(),
        local_ip: "127.0.0.1".to_string(),
        local_port: 15060,
        server_ip: "10.0.0.1".to_string(),
        server_port: 5060,
        channel_count,
        ..DeviceConfig::default()
    }
}

pub fn harness(channel_count: usize) -> Harness {
    harness_with(channel_count, RecordingPublisher::default())
}

pub fn harness_with(channel_count: usize, publisher: RecordingPublisher) -> Harness {
    harness_for(device_config(channel_count), publisher)
}

pub fn harness_for(config: DeviceConfig, publisher: RecordingPublisher) -> Harness {
    let publisher = Arc::new(publisher);
    let exchange = Arc::new(RecordingExchange::default());
    let status = Arc::new(StatusBoard::new());
    let deps = DeviceDeps {
        publisher: publisher.clone(),
        exchange: exchange.clone(),
        status: status.clone(),
    };
    let engine = DeviceEngine::new(
        config,
        "10.0.0.5".to_string(),
        server_addr(),
        deps,
    );
    Harness {
        engine,
        transport: RecordingTransport::default(),
        publisher,
        exchange,
        status,
    }
}

/// 平台发给设备的请求
pub fn platform_request(method: &str, uri_user: &str, call_id: &str, extra: &str, body: &str) -> String {
    let mut raw = format!(
        "{method} sip:{uri_user}@10.0.0.5:15060 SIP/2.0\r\n\
         Via: SIP/2.0/UDP 10.0.0.1:5060;rport;branch=z9hG4bK{call_id}\r\n\
         From: <sip:34020000002000000001@3402000000>;tag=plat-{call_id}\r\n\
         To: <sip:{uri_user}@3402000000>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 20 {method}\r\n\
         {extra}"
    );
    if !body.is_empty() {
        raw.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    raw.push_str("\r\n");
    raw.push_str(body);
    raw
}

pub fn register_response(code: u16, reason: &str, cseq_method: &str) -> String {
    format!(
        "SIP/2.0 {code} {reason}\r\n\
         Via: SIP/2.0/UDP 10.0.0.5:15060;branch=z9hG4bK1\r\n\
         From: <sip:{DEVICE_ID}@10.0.0.1:5060>;tag=dev\r\n\
         To: <sip:{DEVICE_ID}@10.0.0.1:5060>;tag=srv\r\n\
         Call-ID: reg-1\r\n\
         CSeq: 1 {cseq_method}\r\n\
         Content-Length: 0\r\n\
         \r\n"
    )
}

pub fn invite_sdp(ip: &str, port: u16, ssrc: Option<&str>) -> String {
    let mut sdp = format!(
        "v=0\r\n\
         o=34020000002000000001 0 0 IN IP4 {ip}\r\n\
         s=Play\r\n\
         c=IN IP4 {ip}\r\n\
         t=0 0\r\n\
         m=video {port} RTP/AVP 96\r\n\
         a=recvonly\r\n\
         a=rtpmap:96 PS/90000\r\n"
    );
    if let Some(ssrc) = ssrc {
        sdp.push_str(&format!("y={ssrc}\r\n"));
    }
    sdp
}
