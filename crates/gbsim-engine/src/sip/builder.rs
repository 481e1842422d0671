// 设备侧 SIP 报文模板
// 头部顺序与大小写需与平台兼容，不要随意调整

use rand::Rng;

use super::digest;
use super::manscdp;
use super::message::{rewrite_via_host, tag_param, uri_user, SipMessage, SipMethod};

pub const USER_AGENT: &str = "GB28181-Device/1.0";

/// 平台 ID 缺省值（From 中无法提取时使用）
pub const DEFAULT_PLATFORM_ID: &str = "3402000000";

/// 设备在报文中使用的本端/平台地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub device_id: String,
    /// 对外通告地址（Via / Contact / SDP）
    pub contact_ip: String,
    /// 本地监听地址（Call-ID 后缀）
    pub local_ip: String,
    pub local_port: u16,
    pub server_ip: String,
    pub server_port: u16,
}

impl Endpoint {
    fn server_uri(&self) -> String {
        format!("sip:{}:{}", self.server_ip, self.server_port)
    }

    fn via(&self) -> String {
        format!("SIP/2.0/UDP {}:{};branch={}", self.contact_ip, self.local_port, new_branch())
    }

    fn device_aor(&self) -> String {
        format!("<sip:{}@{}:{}>", self.device_id, self.server_ip, self.server_port)
    }

    fn contact(&self) -> String {
        format!("<sip:{}@{}:{}>", self.device_id, self.contact_ip, self.local_port)
    }
}

/// REGISTER 鉴权参数
#[derive(Debug, Clone)]
pub struct RegisterAuth<'a> {
    pub password: &'a str,
    pub realm: &'a str,
    pub nonce: &'a str,
}

fn random_hex(len: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

pub fn new_branch() -> String {
    format!("z9hG4bK{}", random_hex(20))
}

pub fn new_tag() -> String {
    random_hex(32)
}

pub fn new_call_id() -> String {
    random_hex(32)
}

fn content_length(body: &str) -> String {
    body.len().to_string()
}

/// 平台 ID：请求 From 中的 user 部分
pub fn platform_id(req: &SipMessage) -> String {
    req.header("From")
        .and_then(uri_user)
        .unwrap_or(DEFAULT_PLATFORM_ID)
        .to_string()
}

/// REGISTER 请求
pub fn register_request(ep: &Endpoint, auth: &RegisterAuth<'_>, from_tag: &str, expires: u32) -> SipMessage {
    let uri = ep.server_uri();
    let response = digest::compute_response(
        &ep.device_id,
        auth.realm,
        auth.password,
        "REGISTER",
        &uri,
        auth.nonce,
    );

    let mut req = SipMessage::request(SipMethod::Register, uri.clone());
    req.add_header("Via", ep.via());
    req.add_header("From", format!("{};tag={}", ep.device_aor(), from_tag));
    req.add_header("To", ep.device_aor());
    req.add_header("Call-ID", format!("{}@{}", random_hex(8), ep.local_ip));
    req.add_header("CSeq", "1 REGISTER");
    req.add_header("Contact", ep.contact());
    req.add_header(
        "Authorization",
        digest::authorization_header(&ep.device_id, auth.realm, auth.nonce, &uri, &response),
    );
    req.add_header("Max-Forwards", "70");
    req.add_header("User-Agent", USER_AGENT);
    req.add_header("Expires", expires.to_string());
    req.add_header("Content-Length", "0");
    req
}

/// 心跳 MESSAGE
pub fn keepalive_request(ep: &Endpoint, from_tag: &str, sn: u64) -> SipMessage {
    let body = manscdp::keepalive_body(&ep.device_id, sn);

    let mut req = SipMessage::request(SipMethod::Message, ep.server_uri());
    req.add_header("Via", ep.via());
    req.add_header("From", format!("{};tag={}", ep.device_aor(), from_tag));
    req.add_header("To", ep.device_aor());
    req.add_header("Call-ID", new_call_id());
    req.add_header("CSeq", "1 MESSAGE");
    req.add_header("Content-Type", manscdp::CONTENT_TYPE);
    req.add_header("Content-Length", content_length(&body));
    req.add_header("User-Agent", USER_AGENT);
    req.add_header("Max-Forwards", "70");
    req.set_body(body);
    req
}

/// 复制请求中的对话头部：Via(改写) / From / To(补 tag) / Call-ID / CSeq
fn echo_dialog_headers(req: &SipMessage, resp: &mut SipMessage, contact_ip: &str) {
    if let Some(via) = req.header("Via") {
        resp.add_header("Via", rewrite_via_host(via, contact_ip));
    }
    if let Some(from) = req.header("From") {
        resp.add_header("From", from);
    }
    let to = req.header("To").unwrap_or("");
    if tag_param(to).is_some() {
        resp.add_header("To", to);
    } else {
        resp.add_header("To", format!("{};tag={}", to, new_tag()));
    }
    if let Some(call_id) = req.header("Call-ID") {
        resp.add_header("Call-ID", call_id);
    }
    if let Some(cseq) = req.header("CSeq") {
        resp.add_header("CSeq", cseq);
    }
}

/// 通用 200 OK（无消息体）
pub fn ok_response(req: &SipMessage, contact_ip: &str) -> SipMessage {
    let mut resp = SipMessage::response(200, "OK");
    echo_dialog_headers(req, &mut resp, contact_ip);
    resp.add_header("User-Agent", USER_AGENT);
    resp.add_header("Content-Length", "0");
    resp
}

/// 携带 MANSCDP 消息体的 200 OK（DeviceInfo / ConfigDownload）
pub fn ok_with_manscdp(req: &SipMessage, contact_ip: &str, body: String) -> SipMessage {
    let mut resp = SipMessage::response(200, "OK");
    echo_dialog_headers(req, &mut resp, contact_ip);
    resp.add_header("User-Agent", USER_AGENT);
    resp.add_header("Content-Type", manscdp::CONTENT_TYPE);
    resp.add_header("Content-Length", content_length(&body));
    resp.set_body(body);
    resp
}

/// INVITE 200 OK（携带 SDP answer）
pub fn invite_ok(req: &SipMessage, ep: &Endpoint, sdp: String) -> SipMessage {
    let mut resp = SipMessage::response(200, "OK");
    echo_dialog_headers(req, &mut resp, &ep.contact_ip);
    resp.add_header("Contact", ep.contact());
    resp.add_header("User-Agent", USER_AGENT);
    resp.add_header("Content-Type", "application/sdp");
    resp.add_header("Content-Length", content_length(&sdp));
    resp.set_body(sdp);
    resp
}

/// SUBSCRIBE 200 OK（Result=OK）
pub fn subscribe_ok(req: &SipMessage, contact_ip: &str, body: String) -> SipMessage {
    let mut resp = SipMessage::response(200, "OK");
    echo_dialog_headers(req, &mut resp, contact_ip);
    resp.add_header("Content-Type", manscdp::CONTENT_TYPE);
    resp.add_header("User-Agent", USER_AGENT);
    resp.add_header("Content-Length", content_length(&body));
    resp.set_body(body);
    resp
}

/// 设备主动推送的目录 MESSAGE
pub fn catalog_message(ep: &Endpoint, platform_id: &str, body: String) -> SipMessage {
    let platform_aor = format!("<sip:{}@{}:{}>", platform_id, ep.server_ip, ep.server_port);

    let mut req = SipMessage::request(
        SipMethod::Message,
        format!("sip:{}@{}:{}", platform_id, ep.server_ip, ep.server_port),
    );
    req.add_header("Via", ep.via());
    req.add_header("From", format!("{};tag={}", ep.device_aor(), new_tag()));
    req.add_header("To", platform_aor);
    req.add_header("Call-ID", new_call_id());
    req.add_header("CSeq", "1 MESSAGE");
    req.add_header("Content-Type", manscdp::CONTENT_TYPE);
    req.add_header("User-Agent", USER_AGENT);
    req.add_header("Max-Forwards", "70");
    req.add_header("Content-Length", content_length(&body));
    req.set_body(body);
    req
}

/// 目录订阅的 NOTIFY，沿用 SUBSCRIBE 的 Call-ID，To tag 为订阅方 From tag
pub fn catalog_notify(ep: &Endpoint, subscribe: &SipMessage, body: String) -> SipMessage {
    let platform_id = platform_id(subscribe);
    let platform_aor = format!("<sip:{}@{}:{}>", platform_id, ep.server_ip, ep.server_port);
    let to_tag = subscribe
        .header("From")
        .and_then(tag_param)
        .map(str::to_string)
        .unwrap_or_else(new_tag);
    let call_id = subscribe
        .call_id()
        .map(str::to_string)
        .unwrap_or_else(new_call_id);
    let state = match subscribe.header("Expires").and_then(|v| v.trim().parse::<u32>().ok()) {
        Some(expires) => format!("active;expires={};retry-after=0", expires),
        None => "active".to_string(),
    };

    let mut req = SipMessage::request(
        SipMethod::Notify,
        format!("sip:{}@{}:{}", platform_id, ep.server_ip, ep.server_port),
    );
    req.add_header("Via", ep.via());
    req.add_header("From", format!("{};tag={}", ep.device_aor(), new_tag()));
    req.add_header("To", format!("{};tag={}", platform_aor, to_tag));
    req.add_header("Call-ID", call_id);
    req.add_header("CSeq", "1 NOTIFY");
    req.add_header("Content-Type", manscdp::CONTENT_TYPE);
    req.add_header("Event", "presence");
    req.add_header("Subscription-State", state);
    req.add_header("User-Agent", USER_AGENT);
    req.add_header("Max-Forwards", "70");
    req.add_header("Content-Length", content_length(&body));
    req.set_body(body);
    req
}
