// 设备信令状态机
// 所有方法都在设备自己的任务里顺序执行，时间由调用方传入

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::{DeviceConfig, DeviceDeps, RegistrationState};
use crate::channel::{build_channels, Channel};
use crate::exchange::{Direction, ExchangeLog};
use crate::publisher::{StreamRegistry, StreamRequest};
use crate::session::{SessionKey, SessionTracker};
use crate::sip::builder::{self, Endpoint, RegisterAuth};
use crate::sip::manscdp::{self, BasicParam, ManscdpQuery};
use crate::sip::message::{event_type, uri_user, SipMessage, SipMethod, StartLine};
use crate::sip::sdp::{self, SdpOffer};
use crate::status::{DeviceStatus, StatusBoard};
use crate::transport::Transport;

pub struct DeviceEngine {
    config: DeviceConfig,
    endpoint: Endpoint,
    server_addr: SocketAddr,
    channels: Vec<Channel>,
    state: RegistrationState,
    last_register_at: Option<Instant>,
    last_heartbeat_at: Option<Instant>,
    last_heartbeat_wall: Option<DateTime<Utc>>,
    heartbeat_sn: u64,
    heartbeats_sent: u64,
    from_tag: String,
    tracker: SessionTracker,
    streams: StreamRegistry,
    exchange: Arc<dyn ExchangeLog>,
    status: Arc<StatusBoard>,
}

impl DeviceEngine {
    /// `contact_ip` 为对外通告地址，绑定通配地址时由路由探测得到
    pub fn new(config: DeviceConfig, contact_ip: String, server_addr: SocketAddr, deps: DeviceDeps) -> Self {
        let endpoint = Endpoint {
            device_id: config.device_id.clone(),
            contact_ip,
            local_ip: config.local_ip.clone(),
            local_port: config.local_port,
            server_ip: config.server_ip.clone(),
            server_port: config.server_port,
        };
        let channels = build_channels(&config.device_id, &config.name, config.channel_count);

        let engine = Self {
            config,
            endpoint,
            server_addr,
            channels,
            state: RegistrationState::Unregistered,
            last_register_at: None,
            last_heartbeat_at: None,
            last_heartbeat_wall: None,
            heartbeat_sn: 0,
            heartbeats_sent: 0,
            from_tag: builder::new_tag(),
            tracker: SessionTracker::new(),
            streams: StreamRegistry::new(deps.publisher),
            exchange: deps.exchange,
            status: deps.status,
        };
        engine.publish_status();
        engine
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    pub fn last_heartbeat_at(&self) -> Option<Instant> {
        self.last_heartbeat_at
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn active_sessions(&self) -> Vec<SessionKey> {
        self.streams.active_keys()
    }

    pub fn sessions_for(&self, call_id: &str) -> Vec<SessionKey> {
        self.tracker.sessions_for(call_id)
    }

    /// 首次注册
    pub async fn start(&mut self, now: Instant, tx: &dyn Transport) {
        tracing::info!(
            target: "gbsim::device",
            device_id = %self.config.device_id,
            contact = %self.endpoint.contact_ip,
            port = self.endpoint.local_port,
            server = %self.server_addr,
            "Device starting"
        );
        self.send_register(now, tx).await;
    }

    /// 定时检查：心跳与重新注册
    pub async fn tick(&mut self, now: Instant, tx: &dyn Transport) {
        let timers = &self.config.timers;

        if self.state == RegistrationState::Registered {
            let due = self
                .last_heartbeat_at
                .map(|t| now.saturating_duration_since(t) >= timers.heartbeat_interval)
                .unwrap_or(true);
            if due {
                self.send_keepalive(now, tx).await;
            }
        }

        let timers = &self.config.timers;
        let since_attempt = self.last_register_at.map(|t| now.saturating_duration_since(t));
        let expired = since_attempt
            .map(|d| d >= timers.register_expires)
            .unwrap_or(true);
        let retry_allowed = since_attempt
            .map(|d| d >= timers.retry_interval)
            .unwrap_or(true);

        if (self.state != RegistrationState::Registered || expired) && retry_allowed {
            self.send_register(now, tx).await;
        }
    }

    /// 处理一个收到的报文
    pub async fn handle_datagram(&mut self, raw: &str, peer: SocketAddr, now: Instant, tx: &dyn Transport) {
        self.exchange
            .log_exchange(&self.config.device_id, Direction::Inbound, raw, peer);

        let msg = match SipMessage::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(target: "gbsim::device", device_id = %self.config.device_id, peer = %peer, error = %e, "Ignoring unreadable datagram");
                return;
            }
        };

        match &msg.start_line {
            StartLine::Status { .. } => self.on_register_response(&msg, now),
            StartLine::Request { method, .. } => match method {
                SipMethod::Subscribe => self.on_subscribe(&msg, peer, tx).await,
                SipMethod::Message => self.on_message(&msg, peer, tx).await,
                SipMethod::Invite => self.on_invite(&msg, peer, tx).await,
                SipMethod::Bye => self.on_bye(&msg, peer, tx).await,
                other => {
                    tracing::debug!(target: "gbsim::device", device_id = %self.config.device_id, method = %other, "Request accepted without reply");
                }
            },
        }
    }

    /// 停止全部推流，设备退出时调用
    pub async fn shutdown(&mut self) {
        let stopped = self.streams.stop_all().await;
        for key in &stopped {
            self.tracker.forget_session(key);
        }
        self.state = RegistrationState::Unregistered;
        self.publish_status();
        tracing::info!(
            target: "gbsim::device",
            device_id = %self.config.device_id,
            stopped = stopped.len(),
            "Device stopped"
        );
    }

    async fn send(&self, msg: &SipMessage, target: SocketAddr, tx: &dyn Transport) {
        let text = msg.to_string();
        match tx.send_to(text.as_bytes(), target).await {
            Ok(_) => {
                self.exchange
                    .log_exchange(&self.config.device_id, Direction::Outbound, &text, target);
            }
            Err(e) => {
                tracing::warn!(target: "gbsim::device", device_id = %self.config.device_id, peer = %target, error = %e, "Send failed");
            }
        }
    }

    async fn send_register(&mut self, now: Instant, tx: &dyn Transport) {
        let nonce = Utc::now().timestamp().to_string();
        let auth = RegisterAuth {
            password: &self.config.password,
            realm: &self.config.realm,
            nonce: &nonce,
        };
        let expires = u32::try_from(self.config.timers.register_expires.as_secs()).unwrap_or(u32::MAX);
        let req = builder::register_request(&self.endpoint, &auth, &self.from_tag, expires);

        self.send(&req, self.server_addr, tx).await;
        self.last_register_at = Some(now);
        self.state = RegistrationState::Registering;
        self.publish_status();
        tracing::info!(target: "gbsim::device", device_id = %self.config.device_id, server = %self.server_addr, "REGISTER sent");
    }

    async fn send_keepalive(&mut self, now: Instant, tx: &dyn Transport) {
        self.heartbeat_sn += 1;
        let req = builder::keepalive_request(&self.endpoint, &self.from_tag, self.heartbeat_sn);
        self.send(&req, self.server_addr, tx).await;

        self.last_heartbeat_at = Some(now);
        self.last_heartbeat_wall = Some(Utc::now());
        self.heartbeats_sent += 1;
        self.publish_status();
        tracing::debug!(target: "gbsim::device", device_id = %self.config.device_id, sn = self.heartbeat_sn, "Keepalive sent");
    }

    fn on_register_response(&mut self, msg: &SipMessage, now: Instant) {
        let is_register = msg
            .cseq_method()
            .map(|m| m.eq_ignore_ascii_case("REGISTER"))
            .unwrap_or(false);
        if !is_register {
            return;
        }

        match msg.status_code() {
            Some(200) => {
                self.state = RegistrationState::Registered;
                self.last_heartbeat_at = Some(now);
                tracing::info!(target: "gbsim::device", device_id = %self.config.device_id, "Registered");
            }
            Some(401) => {
                self.state = RegistrationState::Unregistered;
                tracing::warn!(target: "gbsim::device", device_id = %self.config.device_id, "Registration rejected (401), will retry");
            }
            Some(code) => {
                tracing::debug!(target: "gbsim::device", device_id = %self.config.device_id, code, "Ignoring REGISTER response");
                return;
            }
            None => return,
        }
        self.publish_status();
    }

    async fn on_message(&mut self, req: &SipMessage, peer: SocketAddr, tx: &dyn Transport) {
        let query = ManscdpQuery::parse(req.body().unwrap_or(""));
        let contact_ip = self.endpoint.contact_ip.clone();

        if query.cmd_is("DeviceInfo") {
            let body = manscdp::device_info_body(&self.config.device_id, &self.config.name, &query.sn_or_now());
            let resp = builder::ok_with_manscdp(req, &contact_ip, body);
            self.send(&resp, peer, tx).await;
        } else if query.cmd_is("ConfigDownload") {
            let param = BasicParam {
                name: &self.config.name,
                device_id: &self.config.device_id,
                ip_address: &contact_ip,
                port: self.config.local_port,
                password: &self.config.password,
            };
            let body = manscdp::config_download_body(&param, &query.sn_or_now());
            let resp = builder::ok_with_manscdp(req, &contact_ip, body);
            self.send(&resp, peer, tx).await;
        } else if query.cmd_is("Catalog") {
            // 先应答查询，再单独推送目录
            let ack = builder::ok_response(req, &contact_ip);
            self.send(&ack, peer, tx).await;

            let sn = query.sn_or_now();
            let body = manscdp::catalog_body(
                &self.config.device_id,
                &sn,
                query.info_id.as_deref(),
                &self.channels,
            );
            let platform_id = builder::platform_id(req);
            let msg = builder::catalog_message(&self.endpoint, &platform_id, body);
            self.send(&msg, self.server_addr, tx).await;
            tracing::info!(
                target: "gbsim::device",
                device_id = %self.config.device_id,
                sn = %sn,
                channels = self.channels.len(),
                "Catalog pushed"
            );
        } else {
            let resp = builder::ok_response(req, &contact_ip);
            self.send(&resp, peer, tx).await;
        }
    }

    async fn on_subscribe(&mut self, req: &SipMessage, peer: SocketAddr, tx: &dyn Transport) {
        let contact_ip = self.endpoint.contact_ip.clone();
        let event = req.header("Event").map(event_type).unwrap_or_default();
        if event != "catalog" {
            let resp = builder::ok_response(req, &contact_ip);
            self.send(&resp, peer, tx).await;
            return;
        }

        let query = ManscdpQuery::parse(req.body().unwrap_or(""));
        let sn = query.sn_or_now();
        let ok_device_id = query
            .device_id
            .clone()
            .unwrap_or_else(|| self.config.device_id.clone());

        let ok_body = manscdp::subscribe_ok_body(&ok_device_id, &sn, self.channels.len());
        let ok = builder::subscribe_ok(req, &contact_ip, ok_body);
        self.send(&ok, peer, tx).await;

        let body = manscdp::catalog_body(
            &self.config.device_id,
            &sn,
            query.info_id.as_deref(),
            &self.channels,
        );
        let notify = builder::catalog_notify(&self.endpoint, req, body);
        self.send(&notify, peer, tx).await;
        tracing::info!(
            target: "gbsim::device",
            device_id = %self.config.device_id,
            peer = %peer,
            sn = %sn,
            "Catalog subscription answered"
        );
    }

    /// 从请求 URI 确定点播通道，找不到时用第一个通道
    fn resolve_channel(&self, req: &SipMessage) -> (String, String) {
        let requested = req.request_uri().and_then(uri_user);
        if let Some(ch) = requested.and_then(|id| self.channels.iter().find(|c| c.id == id)) {
            return (ch.id.clone(), ch.name.clone());
        }
        if let Some(ch) = self.channels.first() {
            return (ch.id.clone(), ch.name.clone());
        }
        let id = requested.unwrap_or(&self.config.device_id).to_string();
        (id.clone(), id)
    }

    async fn on_invite(&mut self, req: &SipMessage, peer: SocketAddr, tx: &dyn Transport) {
        let Some(offer) = req.body().and_then(SdpOffer::parse) else {
            tracing::warn!(target: "gbsim::device", device_id = %self.config.device_id, peer = %peer, "INVITE without usable SDP ignored");
            return;
        };

        let ssrc = offer.ssrc.clone().unwrap_or_else(sdp::generate_ssrc);
        let answer = sdp::build_answer(
            &self.config.device_id,
            &self.endpoint.contact_ip,
            &ssrc,
            offer.stream_param.as_deref(),
        );
        let resp = builder::invite_ok(req, &self.endpoint, answer);
        self.send(&resp, peer, tx).await;

        let (channel_id, channel_name) = self.resolve_channel(req);
        let key = SessionKey::new(channel_id, offer.connection_ip.clone(), offer.video_port);
        let request = StreamRequest {
            key: key.clone(),
            channel_name,
            ssrc: ssrc.clone(),
        };

        match self.streams.start(&request).await {
            Ok(()) => {
                if let Some(call_id) = req.call_id().filter(|c| !c.is_empty()) {
                    self.tracker.associate(call_id, key.clone());
                }
                tracing::info!(target: "gbsim::device", device_id = %self.config.device_id, session = %key, ssrc = %ssrc, "Playback started");
            }
            Err(e) => {
                // 旧流已被停止，旧对话的关联一并清掉
                self.tracker.forget_session(&key);
                tracing::warn!(target: "gbsim::device", device_id = %self.config.device_id, session = %key, error = %e, "Failed to start stream");
            }
        }
        self.publish_status();
    }

    async fn on_bye(&mut self, req: &SipMessage, peer: SocketAddr, tx: &dyn Transport) {
        let resp = builder::ok_response(req, &self.endpoint.contact_ip);
        self.send(&resp, peer, tx).await;

        let call_id = req.call_id().unwrap_or("");
        let tracked = self.tracker.sessions_for(call_id);

        if !tracked.is_empty() {
            for key in &tracked {
                self.streams.stop(key).await;
            }
            self.tracker.forget(call_id);
            tracing::info!(target: "gbsim::device", device_id = %self.config.device_id, call_id = %call_id, stopped = tracked.len(), "Dialog ended");
        } else if let Some(channel_id) = req.request_uri().and_then(uri_user) {
            let stopped = self.streams.stop_channel(channel_id).await;
            for key in &stopped {
                self.tracker.forget_session(key);
            }
            tracing::info!(target: "gbsim::device", device_id = %self.config.device_id, channel = %channel_id, stopped = stopped.len(), "Channel streams stopped");
        } else {
            let stopped = self.streams.stop_all().await;
            for key in &stopped {
                self.tracker.forget_session(key);
            }
            tracing::info!(target: "gbsim::device", device_id = %self.config.device_id, stopped = stopped.len(), "All streams stopped");
        }
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status.upsert(DeviceStatus {
            device_id: self.config.device_id.clone(),
            name: self.config.name.clone(),
            local_port: self.endpoint.local_port,
            contact_ip: self.endpoint.contact_ip.clone(),
            state: self.state,
            active_sessions: self.streams.len(),
            heartbeats_sent: self.heartbeats_sent,
            last_heartbeat: self.last_heartbeat_wall,
        });
    }
}
