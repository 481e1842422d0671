// 设备通道（IPC 摄像头通道）
// 通道 ID 由设备 ID 推导，目录字段统一由 apply_defaults 补齐

use std::collections::BTreeMap;

/// 目录字段名
pub mod attr {
    pub const MANUFACTURER: &str = "manufacturer";
    pub const MODEL: &str = "model";
    pub const OWNER: &str = "owner";
    pub const CIVIL_CODE: &str = "civil_code";
    pub const ADDRESS: &str = "address";
    pub const PARENTAL: &str = "parental";
    pub const PARENT_ID: &str = "parent_id";
    pub const SAFETY_WAY: &str = "safety_way";
    pub const REGISTER_WAY: &str = "register_way";
    pub const SECRECY: &str = "secrecy";
    pub const STATUS: &str = "status";
    pub const ONLINE: &str = "online";
    pub const ALARM_STATUS: &str = "alarm_status";
}

const DEFAULT_CIVIL_CODE: &str = "340200";

/// 通道信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    attributes: BTreeMap<String, String>,
}

impl Channel {
    /// 创建通道并补齐 GB28181 目录字段
    pub fn new(id: impl Into<String>, name: impl Into<String>, device_id: &str) -> Self {
        let mut attributes = BTreeMap::new();
        apply_defaults(&mut attributes, device_id);
        Self {
            id: id.into(),
            name: name.into(),
            attributes,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// 覆盖字段
    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn is_parental(&self) -> bool {
        self.attribute(attr::PARENTAL) == Some("1")
    }
}

/// 补齐 GB28181 强制的目录字段，已存在的字段不覆盖
pub fn apply_defaults(attributes: &mut BTreeMap<String, String>, device_id: &str) {
    let civil_code = if device_id.chars().count() >= 6 {
        device_id.chars().take(6).collect()
    } else {
        DEFAULT_CIVIL_CODE.to_string()
    };

    let defaults = [
        (attr::MANUFACTURER, "IPC".to_string()),
        (attr::MODEL, "IPC".to_string()),
        (attr::OWNER, device_id.to_string()),
        (attr::CIVIL_CODE, civil_code),
        (attr::ADDRESS, "Address".to_string()),
        (attr::PARENTAL, "0".to_string()),
        (attr::PARENT_ID, device_id.to_string()),
        (attr::SAFETY_WAY, "0".to_string()),
        (attr::REGISTER_WAY, "1".to_string()),
        (attr::SECRECY, "0".to_string()),
        (attr::STATUS, "ON".to_string()),
        (attr::ONLINE, "ON".to_string()),
        (attr::ALARM_STATUS, "READY".to_string()),
    ];

    for (key, value) in defaults {
        attributes.entry(key.to_string()).or_insert(value);
    }
}

/// 推导通道 ID
///
/// 设备 ID 为纯数字时：设备 ID + 100 + index，按十进制相加后补齐 20 位；
/// 否则把末两位替换为 (10 + index) 的两位数字。
pub fn derive_channel_id(device_id: &str, index: usize) -> String {
    if !device_id.is_empty() && device_id.bytes().all(|b| b.is_ascii_digit()) {
        let sum = add_decimal(device_id, 100 + index as u64);
        return format!("{:0>20}", sum);
    }

    let suffix = format!("{:02}", 10 + index);
    if device_id.chars().count() >= 2 {
        let keep: String = device_id
            .chars()
            .take(device_id.chars().count() - 2)
            .collect();
        format!("{}{}", keep, suffix)
    } else {
        format!("{}{}", device_id, suffix)
    }
}

/// 任意长度十进制字符串加法，结果去掉前导零
fn add_decimal(digits: &str, addend: u64) -> String {
    let mut result: Vec<u8> = Vec::with_capacity(digits.len() + 1);
    let mut carry = addend;

    for b in digits.bytes().rev() {
        let total = u64::from(b - b'0') + carry % 10;
        carry /= 10;
        carry += total / 10;
        result.push(b'0' + (total % 10) as u8);
    }
    while carry > 0 {
        result.push(b'0' + (carry % 10) as u8);
        carry /= 10;
    }

    while result.len() > 1 && result.last() == Some(&b'0') {
        result.pop();
    }
    result.reverse();
    String::from_utf8(result).unwrap_or_default()
}

/// 按设备生成通道列表，名称为 `设备名-通道N`
pub fn build_channels(device_id: &str, device_name: &str, count: usize) -> Vec<Channel> {
    (0..count)
        .map(|i| {
            Channel::new(
                derive_channel_id(device_id, i),
                format!("{}-通道{}", device_name, i + 1),
                device_id,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_channel_id() {
        assert_eq!(derive_channel_id("34020000001320000001", 0), "34020000001320000101");
        assert_eq!(derive_channel_id("34020000001320000001", 1), "34020000001320000102");
        assert_eq!(derive_channel_id("34020000001320000999", 5), "34020000001320001104");
    }

    #[test]
    fn test_numeric_channel_id_pads_short_ids() {
        assert_eq!(derive_channel_id("1", 0), "00000000000000000101");
        assert_eq!(derive_channel_id("0000000000000000000000001", 0), "00000000000000000101");
    }

    #[test]
    fn test_numeric_channel_id_is_offset_of_device_id() {
        let device_id = "34020000001320000042";
        for i in 0..16 {
            let channel: u128 = derive_channel_id(device_id, i).parse().unwrap();
            let base: u128 = device_id.parse().unwrap();
            assert_eq!(channel - base, 100 + i as u128);
        }
    }

    #[test]
    fn test_non_numeric_channel_id_fallback() {
        assert_eq!(derive_channel_id("CAM-DEVICE-01", 0), "CAM-DEVICE-10");
        assert_eq!(derive_channel_id("CAM-DEVICE-01", 3), "CAM-DEVICE-13");
        assert_eq!(derive_channel_id("X", 0), "X10");
        assert_eq!(derive_channel_id("", 1), "11");
    }

    #[test]
    fn test_defaults_schema() {
        let ch = Channel::new("34020000001320000101", "设备-通道1", "34020000001320000001");
        assert_eq!(ch.attribute(attr::MANUFACTURER), Some("IPC"));
        assert_eq!(ch.attribute(attr::OWNER), Some("34020000001320000001"));
        assert_eq!(ch.attribute(attr::CIVIL_CODE), Some("340200"));
        assert_eq!(ch.attribute(attr::REGISTER_WAY), Some("1"));
        assert_eq!(ch.attribute(attr::ALARM_STATUS), Some("READY"));
        assert!(!ch.is_parental());

        let short = Channel::new("ABC10", "n", "ABC");
        assert_eq!(short.attribute(attr::CIVIL_CODE), Some(DEFAULT_CIVIL_CODE));
    }

    #[test]
    fn test_apply_defaults_keeps_overrides() {
        let mut attrs = BTreeMap::new();
        attrs.insert(attr::STATUS.to_string(), "OFF".to_string());
        apply_defaults(&mut attrs, "34020000001320000001");
        assert_eq!(attrs.get(attr::STATUS).map(String::as_str), Some("OFF"));
        assert_eq!(attrs.get(attr::ONLINE).map(String::as_str), Some("ON"));
    }

    #[test]
    fn test_build_channels_names() {
        let channels = build_channels("34020000001320000001", "模拟设备1", 2);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "模拟设备1-通道1");
        assert_eq!(channels[1].id, "34020000001320000102");
    }
}
