// 点播会话跟踪
// Call-ID -> 会话键列表，会话键为 channel@ip:port，同一会话键只归属一个 Call-ID

use std::fmt;

use dashmap::DashMap;

/// 推流会话键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub channel_id: String,
    pub ip: String,
    pub port: u16,
}

impl SessionKey {
    pub fn new(channel_id: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            channel_id: channel_id.into(),
            ip: ip.into(),
            port,
        }
    }

    pub fn belongs_to(&self, channel_id: &str) -> bool {
        self.channel_id == channel_id
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.channel_id, self.ip, self.port)
    }
}

/// 会话跟踪器
#[derive(Debug, Default)]
pub struct SessionTracker {
    dialogs: DashMap<String, Vec<SessionKey>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 关联 Call-ID 与会话键；会话键若挂在其他 Call-ID 下会先摘除
    pub fn associate(&self, call_id: &str, key: SessionKey) {
        for mut entry in self.dialogs.iter_mut() {
            if entry.key() != call_id {
                entry.value_mut().retain(|k| k != &key);
            }
        }
        self.dialogs.retain(|_, keys| !keys.is_empty());

        let mut keys = self.dialogs.entry(call_id.to_string()).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    /// 按插入顺序返回 Call-ID 下的会话键
    pub fn sessions_for(&self, call_id: &str) -> Vec<SessionKey> {
        self.dialogs
            .get(call_id)
            .map(|keys| keys.value().clone())
            .unwrap_or_default()
    }

    /// 移除 Call-ID，返回其会话键
    pub fn forget(&self, call_id: &str) -> Vec<SessionKey> {
        self.dialogs
            .remove(call_id)
            .map(|(_, keys)| keys)
            .unwrap_or_default()
    }

    /// 从所属 Call-ID 中移除单个会话键，空对话一并清理
    pub fn forget_session(&self, key: &SessionKey) {
        for mut entry in self.dialogs.iter_mut() {
            entry.value_mut().retain(|k| k != key);
        }
        self.dialogs.retain(|_, keys| !keys.is_empty());
    }

    pub fn dialog_count(&self) -> usize {
        self.dialogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogs.is_empty()
    }
}
