// 控制台报文打印：收包绿色、发包蓝色，单条最多 50 行

use std::io::Write;
use std::net::SocketAddr;

use chrono::Local;
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use gbsim_engine::{Direction, ExchangeLog};

const MAX_LINES: usize = 50;

/// 报文打印范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExchangeMode {
    /// 全部报文
    All,
    /// 仅目录相关报文
    Catalog,
    /// 不打印
    Off,
}

impl ExchangeMode {
    pub fn accepts(&self, text: &str) -> bool {
        match self {
            ExchangeMode::All => true,
            ExchangeMode::Catalog => text.to_ascii_lowercase().contains("catalog"),
            ExchangeMode::Off => false,
        }
    }
}

pub struct ConsoleExchangeLog {
    mode: ExchangeMode,
}

impl ConsoleExchangeLog {
    pub fn new(mode: ExchangeMode) -> Self {
        Self { mode }
    }
}

fn paint(direction: Direction, line: &str) -> ColoredString {
    match direction {
        Direction::Inbound => line.green(),
        Direction::Outbound => line.blue(),
    }
}

/// 生成一条带边框的报文块
pub fn render(device_id: &str, direction: Direction, text: &str, peer: SocketAddr, time: &str) -> String {
    let arrow = match direction {
        Direction::Inbound => "<<",
        Direction::Outbound => ">>",
    };

    let header = format!("==== {time} [{device_id}] {direction} {arrow} {peer} ====");
    let mut out = format!("{}\n", paint(direction, &header));
    let lines: Vec<&str> = text.lines().collect();
    for line in lines.iter().take(MAX_LINES) {
        out.push_str(&format!("{}\n", paint(direction, line)));
    }
    if lines.len() > MAX_LINES {
        let more = format!("... ({} more lines)", lines.len() - MAX_LINES);
        out.push_str(&format!("{}\n", paint(direction, &more)));
    }
    out
}

impl ExchangeLog for ConsoleExchangeLog {
    fn log_exchange(&self, device_id: &str, direction: Direction, text: &str, peer: SocketAddr) {
        if !self.mode.accepts(text) {
            return;
        }
        let time = Local::now().format("%H:%M:%S%.3f").to_string();
        let block = render(device_id, direction, text, peer, &time);

        // 整块写出，避免多个设备的输出交错
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(block.as_bytes());
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: &str = "10.0.0.1:5060";

    #[test]
    fn test_mode_filter() {
        let catalog = "MESSAGE sip:x SIP/2.0\r\n\r\n<CmdType>Catalog</CmdType>";
        let keepalive = "MESSAGE sip:x SIP/2.0\r\n\r\n<CmdType>Keepalive</CmdType>";

        assert!(ExchangeMode::All.accepts(keepalive));
        assert!(ExchangeMode::Catalog.accepts(catalog));
        assert!(ExchangeMode::Catalog.accepts("SUBSCRIBE sip:x SIP/2.0\r\nEvent: Catalog\r\n"));
        assert!(!ExchangeMode::Catalog.accepts(keepalive));
        assert!(!ExchangeMode::Off.accepts(catalog));
    }

    #[test]
    fn test_render_colors_and_header() {
        colored::control::set_override(true);
        let peer = PEER.parse().unwrap();
        let inbound = render("dev1", Direction::Inbound, "BYE sip:a SIP/2.0", peer, "12:00:00.000");
        let mut lines = inbound.lines();
        assert_eq!(
            lines.next(),
            Some("==== 12:00:00.000 [dev1] recv << 10.0.0.1:5060 ====".green().to_string().as_str())
        );
        assert_eq!(lines.next(), Some("BYE sip:a SIP/2.0".green().to_string().as_str()));

        let outbound = render("dev1", Direction::Outbound, "SIP/2.0 200 OK", peer, "12:00:00.000");
        assert!(outbound.contains("send >>"));
        assert!(outbound.ends_with(&format!("{}\n", "SIP/2.0 200 OK".blue())));
    }

    #[test]
    fn test_render_truncates_long_messages() {
        let peer = PEER.parse().unwrap();
        let text: Vec<String> = (0..80).map(|i| format!("line{}", i)).collect();
        let block = render("dev1", Direction::Inbound, &text.join("\r\n"), peer, "t");

        assert!(block.contains("line49"));
        assert!(!block.contains("line50"));
        assert!(block.contains("... (30 more lines)"));
        // 标题 + 50 行 + 省略提示
        assert_eq!(block.lines().count(), 52);
    }
}
