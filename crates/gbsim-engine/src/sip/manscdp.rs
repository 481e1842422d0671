// GB28181 MANSCDP XML 消息体
// 请求体用 quick-xml 反序列化，应答体按字段模板生成

use quick_xml::escape::escape;
use serde::Deserialize;

use crate::channel::{attr, Channel};

pub const CONTENT_TYPE: &str = "Application/MANSCDP+xml";

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"GB2312\"?>";

/// 平台下发的 Query / Subscribe 请求体中设备关心的字段
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
pub struct ManscdpQuery {
    #[serde(rename = "CmdType")]
    pub cmd_type: Option<String>,

    #[serde(rename = "SN")]
    pub sn: Option<String>,

    #[serde(rename = "DeviceID")]
    pub device_id: Option<String>,

    #[serde(rename = "InfoID")]
    pub info_id: Option<String>,
}

impl ManscdpQuery {
    /// 解析请求体，无法解析时返回空查询
    pub fn parse(body: &str) -> Self {
        let xml = body.trim();
        if xml.is_empty() {
            return Self::default();
        }
        match quick_xml::de::from_str::<ManscdpQuery>(xml) {
            Ok(query) => query.normalized(),
            Err(e) => {
                tracing::debug!(target: "gbsim::manscdp", error = %e, "Unreadable MANSCDP body");
                Self::default()
            }
        }
    }

    fn normalized(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            cmd_type: clean(self.cmd_type),
            sn: clean(self.sn),
            device_id: clean(self.device_id),
            info_id: clean(self.info_id),
        }
    }

    /// CmdType 比较（忽略大小写）
    pub fn cmd_is(&self, name: &str) -> bool {
        self.cmd_type
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(name))
            .unwrap_or(false)
    }

    /// SN，缺省时取当前 Unix 秒
    pub fn sn_or_now(&self) -> String {
        self.sn
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().timestamp().to_string())
    }
}

fn element(name: &str, value: &str) -> String {
    format!("<{}>{}</{}>\r\n", name, escape(value), name)
}

/// 心跳（Keepalive）通知
pub fn keepalive_body(device_id: &str, sn: u64) -> String {
    let mut xml = format!("{}\r\n<Notify>\r\n", XML_DECL);
    xml.push_str(&element("CmdType", "Keepalive"));
    xml.push_str(&element("SN", &sn.to_string()));
    xml.push_str(&element("DeviceID", device_id));
    xml.push_str(&element("Status", "OK"));
    xml.push_str("<Info></Info>\r\n");
    xml.push_str("</Notify>\r\n");
    xml
}

/// 设备信息应答
pub fn device_info_body(device_id: &str, device_name: &str, sn: &str) -> String {
    let mut xml = format!("{}\r\n<Response>\r\n", XML_DECL);
    xml.push_str(&element("CmdType", "DeviceInfo"));
    xml.push_str(&element("SN", sn));
    xml.push_str(&element("DeviceID", device_id));
    xml.push_str(&element("DeviceName", device_name));
    xml.push_str(&element("Manufacturer", "GB28181-Simulator"));
    xml.push_str(&element("Model", "IPC-Simulator-v1.0"));
    xml.push_str(&element("Firmware", "v1.0.0"));
    xml.push_str(&element("Result", "OK"));
    xml.push_str("</Response>\r\n");
    xml
}

/// 配置下载中的基本参数
#[derive(Debug, Clone)]
pub struct BasicParam<'a> {
    pub name: &'a str,
    pub device_id: &'a str,
    pub ip_address: &'a str,
    pub port: u16,
    pub password: &'a str,
}

/// 配置下载应答
pub fn config_download_body(param: &BasicParam<'_>, sn: &str) -> String {
    let mut xml = format!("{}\r\n<Response>\r\n", XML_DECL);
    xml.push_str(&element("CmdType", "ConfigDownload"));
    xml.push_str(&element("SN", sn));
    xml.push_str(&element("DeviceID", param.device_id));
    xml.push_str(&element("Result", "OK"));
    xml.push_str("<BasicParam>\r\n");
    xml.push_str(&element("Name", param.name));
    xml.push_str(&element("DeviceID", param.device_id));
    xml.push_str(&element("IPAddress", param.ip_address));
    xml.push_str(&element("Port", &param.port.to_string()));
    xml.push_str(&element("Password", param.password));
    xml.push_str("</BasicParam>\r\n");
    xml.push_str("</Response>\r\n");
    xml
}

/// 通道目录
pub fn catalog_body(device_id: &str, sn: &str, info_id: Option<&str>, channels: &[Channel]) -> String {
    let mut xml = format!("{}\r\n<Response>\r\n", XML_DECL);
    xml.push_str(&element("CmdType", "Catalog"));
    xml.push_str(&element("SN", sn));
    xml.push_str(&element("DeviceID", device_id));
    xml.push_str(&element("SumNum", &channels.len().to_string()));
    if let Some(info_id) = info_id.filter(|s| !s.is_empty()) {
        xml.push_str(&element("InfoID", info_id));
    }
    xml.push_str(&format!("<DeviceList Num=\"{}\">\r\n", channels.len()));

    for channel in channels {
        let get = |key: &str, default: &str| -> String {
            channel.attribute(key).unwrap_or(default).to_string()
        };
        let civil_code: String = get(attr::CIVIL_CODE, "340200").chars().take(6).collect();

        xml.push_str("<Item>\r\n");
        xml.push_str(&element("DeviceID", &channel.id));
        xml.push_str(&element("Name", &channel.name));
        xml.push_str(&element("Manufacturer", &get(attr::MANUFACTURER, "IPC")));
        xml.push_str(&element("Model", &get(attr::MODEL, "IPC")));
        xml.push_str(&element("Owner", &get(attr::OWNER, device_id)));
        xml.push_str(&element("CivilCode", &civil_code));
        xml.push_str(&element("Address", &get(attr::ADDRESS, "Address")));
        xml.push_str(&element("Parental", &get(attr::PARENTAL, "0")));
        if channel.is_parental() {
            xml.push_str(&element("ParentID", &get(attr::PARENT_ID, device_id)));
        }
        xml.push_str(&element("SafetyWay", &get(attr::SAFETY_WAY, "0")));
        xml.push_str(&element("RegisterWay", &get(attr::REGISTER_WAY, "1")));
        xml.push_str(&element("Secrecy", &get(attr::SECRECY, "0")));
        xml.push_str(&element("Status", &get(attr::STATUS, "ON")));
        xml.push_str(&element("Online", &get(attr::ONLINE, "ON")));
        xml.push_str(&element("AlarmStatus", &get(attr::ALARM_STATUS, "READY")));
        xml.push_str("</Item>\r\n");
    }

    xml.push_str("</DeviceList>\r\n");
    xml.push_str("</Response>\r\n");
    xml
}

/// 目录订阅应答（Result=OK，附带通道总数）
pub fn subscribe_ok_body(device_id: &str, sn: &str, sum_num: usize) -> String {
    let mut xml = format!("{}\r\n<Response>\r\n", XML_DECL);
    xml.push_str(&element("CmdType", "Catalog"));
    xml.push_str(&element("SN", sn));
    xml.push_str(&element("DeviceID", device_id));
    xml.push_str(&element("SumNum", &sum_num.to_string()));
    xml.push_str(&element("Result", "OK"));
    xml.push_str("</Response>\r\n");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::build_channels;

    #[test]
    fn test_parse_catalog_query() {
        let body = "<?xml version=\"1.0\" encoding=\"GB2312\"?>\r\n\
                    <Query>\r\n\
                    <CmdType>Catalog</CmdType>\r\n\
                    <SN>17430</SN>\r\n\
                    <DeviceID>34020000001320000001</DeviceID>\r\n\
                    </Query>";
        let query = ManscdpQuery::parse(body);
        assert!(query.cmd_is("catalog"));
        assert_eq!(query.sn.as_deref(), Some("17430"));
        assert_eq!(query.device_id.as_deref(), Some("34020000001320000001"));
        assert_eq!(query.info_id, None);
    }

    #[test]
    fn test_parse_ignores_unknown_elements() {
        let body = "<Query><CmdType>DeviceInfo</CmdType><SN> 9 </SN><Extra><A>1</A></Extra><InfoID>abc</InfoID></Query>";
        let query = ManscdpQuery::parse(body);
        assert!(query.cmd_is("DEVICEINFO"));
        assert_eq!(query.sn.as_deref(), Some("9"));
        assert_eq!(query.info_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_garbage_falls_back() {
        let query = ManscdpQuery::parse("not xml at all <<<");
        assert_eq!(query, ManscdpQuery::default());
        assert!(!query.cmd_is("Catalog"));
        let sn: i64 = query.sn_or_now().parse().unwrap();
        assert!(sn > 1_600_000_000);
    }

    #[test]
    fn test_catalog_body_lists_every_channel() {
        let channels = build_channels("34020000001320000001", "模拟设备1", 3);
        let xml = catalog_body("34020000001320000001", "42", Some("info-1"), &channels);
        assert!(xml.contains("<SumNum>3</SumNum>"));
        assert!(xml.contains("<DeviceList Num=\"3\">"));
        assert!(xml.contains("<InfoID>info-1</InfoID>"));
        assert_eq!(xml.matches("<Item>").count(), 3);
        assert!(xml.contains("<DeviceID>34020000001320000103</DeviceID>"));
        assert!(xml.contains("<Name>模拟设备1-通道2</Name>"));
        assert!(xml.contains("<CivilCode>340200</CivilCode>"));
        assert!(!xml.contains("<ParentID>"));
    }

    #[test]
    fn test_catalog_parent_id_only_for_parental() {
        let mut channels = build_channels("34020000001320000001", "d", 1);
        channels[0].set_attribute(attr::PARENTAL, "1");
        let xml = catalog_body("34020000001320000001", "1", None, &channels);
        assert!(xml.contains("<ParentID>34020000001320000001</ParentID>"));
        assert!(!xml.contains("<InfoID>"));
    }

    #[test]
    fn test_bodies_escape_text() {
        let xml = device_info_body("dev", "A&B <cam>", "1");
        assert!(xml.contains("<DeviceName>A&amp;B &lt;cam&gt;</DeviceName>"));
    }

    #[test]
    fn test_keepalive_and_config_bodies() {
        let ka = keepalive_body("34020000001320000001", 7);
        assert!(ka.contains("<CmdType>Keepalive</CmdType>"));
        assert!(ka.contains("<SN>7</SN>"));
        assert!(ka.contains("<Status>OK</Status>"));

        let param = BasicParam {
            name: "模拟设备1",
            device_id: "34020000001320000001",
            ip_address: "10.0.0.5",
            port: 15060,
            password: "123456",
        };
        let cfg = config_download_body(&param, "5");
        assert!(cfg.contains("<BasicParam>\r\n<Name>模拟设备1</Name>"));
        assert!(cfg.contains("<IPAddress>10.0.0.5</IPAddress>"));
        assert!(cfg.contains("<Port>15060</Port>"));
    }
}
