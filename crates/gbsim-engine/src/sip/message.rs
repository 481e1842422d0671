// SIP 消息解析和生成
// 头部保持原始顺序，允许重复，查找时取第一个

use std::fmt;
use std::net::IpAddr;

use crate::error::{Result, SimError};

/// SIP 方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SipMethod {
    Register,
    Invite,
    Ack,
    Bye,
    Cancel,
    Message,
    Subscribe,
    Notify,
    Info,
    Other(String),
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SipMethod::Register => write!(f, "REGISTER"),
            SipMethod::Invite => write!(f, "INVITE"),
            SipMethod::Ack => write!(f, "ACK"),
            SipMethod::Bye => write!(f, "BYE"),
            SipMethod::Cancel => write!(f, "CANCEL"),
            SipMethod::Message => write!(f, "MESSAGE"),
            SipMethod::Subscribe => write!(f, "SUBSCRIBE"),
            SipMethod::Notify => write!(f, "NOTIFY"),
            SipMethod::Info => write!(f, "INFO"),
            SipMethod::Other(s) => write!(f, "{}", s),
        }
    }
}

impl SipMethod {
    pub fn from_token(s: &str) -> Self {
        match s {
            "REGISTER" => SipMethod::Register,
            "INVITE" => SipMethod::Invite,
            "ACK" => SipMethod::Ack,
            "BYE" => SipMethod::Bye,
            "CANCEL" => SipMethod::Cancel,
            "MESSAGE" => SipMethod::Message,
            "SUBSCRIBE" => SipMethod::Subscribe,
            "NOTIFY" => SipMethod::Notify,
            "INFO" => SipMethod::Info,
            other => SipMethod::Other(other.to_string()),
        }
    }
}

/// 起始行：请求行或状态行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: SipMethod,
        uri: String,
        version: String,
    },
    Status {
        version: String,
        code: u16,
        reason: String,
    },
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartLine::Request { method, uri, version } => write!(f, "{} {} {}", method, uri, version),
            StartLine::Status { version, code, reason } => write!(f, "{} {} {}", version, code, reason),
        }
    }
}

/// SIP 消息（请求或响应）
#[derive(Debug, Clone)]
pub struct SipMessage {
    pub start_line: StartLine,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl SipMessage {
    pub fn request(method: SipMethod, uri: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Request {
                method,
                uri: uri.into(),
                version: "SIP/2.0".to_string(),
            },
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn response(code: u16, reason: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Status {
                version: "SIP/2.0".to_string(),
                code,
                reason: reason.into(),
            },
            headers: Vec::new(),
            body: None,
        }
    }

    /// 追加头部（不去重）
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_string(), value.into()));
    }

    /// 设置消息体
    pub fn set_body(&mut self, body: String) {
        self.body = Some(body);
    }

    /// 按名称查找头部，大小写敏感，返回第一个匹配
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn method(&self) -> Option<&SipMethod> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Status { .. } => None,
        }
    }

    pub fn request_uri(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { uri, .. } => Some(uri.as_str()),
            StartLine::Status { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Status { code, .. } => Some(*code),
            StartLine::Request { .. } => None,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        self.header("Call-ID")
    }

    /// CSeq 中的方法部分，例如 `1 REGISTER` -> `REGISTER`
    pub fn cseq_method(&self) -> Option<&str> {
        self.header("CSeq")
            .and_then(|v| v.split_whitespace().nth(1))
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// 解析原始 UDP 负载
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .collect();

        let first = lines.first().map(|l| l.trim()).unwrap_or("");
        if first.is_empty() {
            return Err(SimError::Parse("Empty SIP message".to_string()));
        }

        let start_line = parse_start_line(first)?;

        // 解析头部，直到第一个空行
        let mut headers = Vec::new();
        let mut body_start = lines.len();
        for (i, line) in lines.iter().enumerate().skip(1) {
            if line.is_empty() {
                body_start = i + 1;
                break;
            }
            if let Some(pos) = line.find(':') {
                headers.push((line[..pos].to_string(), line[pos + 1..].trim().to_string()));
            }
        }

        let body = if body_start < lines.len() {
            let body_str = lines[body_start..].join("\r\n");
            if body_str.trim().is_empty() {
                None
            } else {
                Some(body_str)
            }
        } else {
            None
        };

        Ok(Self {
            start_line,
            headers,
            body,
        })
    }
}

fn parse_start_line(line: &str) -> Result<StartLine> {
    if line.starts_with("SIP/") {
        let parts: Vec<&str> = line.splitn(3, ' ').collect();
        if parts.len() < 2 {
            return Err(SimError::Parse(format!("Invalid status line: {}", line)));
        }
        let code = parts[1]
            .parse::<u16>()
            .map_err(|_| SimError::Parse(format!("Invalid status code: {}", parts[1])))?;
        Ok(StartLine::Status {
            version: parts[0].to_string(),
            code,
            reason: parts.get(2).unwrap_or(&"").to_string(),
        })
    } else {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(SimError::Parse(format!("Invalid request line: {}", line)));
        }
        Ok(StartLine::Request {
            method: SipMethod::from_token(parts[0]),
            uri: parts[1].to_string(),
            version: parts[2].to_string(),
        })
    }
}

impl fmt::Display for SipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.start_line)?;
        for (key, value) in &self.headers {
            write!(f, "{}: {}\r\n", key, value)?;
        }
        f.write_str("\r\n")?;
        if let Some(body) = &self.body {
            f.write_str(body)?;
        }
        Ok(())
    }
}

/// 提取头部值中的 tag 参数
pub fn tag_param(value: &str) -> Option<&str> {
    let start = value.find(";tag=")? + ";tag=".len();
    let rest = &value[start..];
    let end = rest
        .find(|c: char| c == ';' || c == '>' || c.is_whitespace())
        .unwrap_or(rest.len());
    let tag = &rest[..end];
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}

/// 提取 `sip:user@host` 中的 user 部分
pub fn uri_user(value: &str) -> Option<&str> {
    let start = value.find("sip:")? + "sip:".len();
    let rest = &value[start..];
    let at = rest.find('@')?;
    if at == 0 {
        None
    } else {
        Some(&rest[..at])
    }
}

/// Event 头的事件类型（去掉参数，小写）
pub fn event_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// 改写 Via 中不可路由的地址，端口和参数（branch 等）保持不变
///
/// 当地址是通配地址，或是与对外地址不同的回环地址时才改写。
pub fn rewrite_via_host(via: &str, contact_ip: &str) -> String {
    let Some((transport, rest)) = via.split_once(char::is_whitespace) else {
        return via.to_string();
    };
    let rest = rest.trim_start();
    let (sent_by, params) = match rest.find(';') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, ""),
    };
    let (host, port) = match sent_by.split_once(':') {
        Some((h, p)) => (h, Some(p)),
        None => (sent_by, None),
    };

    let unroutable = match host.parse::<IpAddr>() {
        Ok(ip) => ip.is_unspecified() || (ip.is_loopback() && host != contact_ip),
        Err(_) => false,
    };
    if !unroutable {
        return via.to_string();
    }

    match port {
        Some(port) => format!("{} {}:{}{}", transport, contact_ip, port, params),
        None => format!("{} {}{}", transport, contact_ip, params),
    }
}
