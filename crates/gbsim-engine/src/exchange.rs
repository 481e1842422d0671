// 信令报文观察接口
// 核心只负责上报收发的原始报文，怎么展示由调用方决定

use std::fmt;
use std::net::SocketAddr;

/// 报文方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "recv"),
            Direction::Outbound => write!(f, "send"),
        }
    }
}

pub trait ExchangeLog: Send + Sync {
    fn log_exchange(&self, device_id: &str, direction: Direction, text: &str, peer: SocketAddr);
}

/// 不输出任何报文
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExchangeLog;

impl ExchangeLog for NullExchangeLog {
    fn log_exchange(&self, _device_id: &str, _direction: Direction, _text: &str, _peer: SocketAddr) {}
}
