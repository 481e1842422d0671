// GB28181 Digest 鉴权（MD5）

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

/// 计算 Digest response
///
/// HA1 = MD5(username:realm:password)
/// HA2 = MD5(method:uri)
/// response = MD5(HA1:nonce:HA2)
pub fn compute_response(
    username: &str,
    realm: &str,
    password: &str,
    method: &str,
    uri: &str,
    nonce: &str,
) -> String {
    let ha1 = md5_hex(&format!("{}:{}:{}", username, realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2))
}

/// 生成 Authorization 头部值
pub fn authorization_header(
    username: &str,
    realm: &str,
    nonce: &str,
    uri: &str,
    response: &str,
) -> String {
    format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
        username, realm, nonce, uri, response
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_response_matches_two_stage_md5() {
        let response = compute_response(
            "34020000001320000001",
            "3402000000",
            "123456",
            "REGISTER",
            "sip:192.168.32.84:8809",
            "1700000000",
        );
        assert_eq!(response, "e59cb7de37b3e833dc2bd1afb39f49db");
    }

    #[test]
    fn test_compute_response_is_deterministic() {
        let a = compute_response("u", "r", "p", "REGISTER", "sip:h:1", "n");
        let b = compute_response("u", "r", "p", "REGISTER", "sip:h:1", "n");
        let c = compute_response("u", "r", "p", "REGISTER", "sip:h:1", "m");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_authorization_header_format() {
        let header = authorization_header("dev", "3402000000", "42", "sip:1.2.3.4:5060", "abcd");
        assert_eq!(
            header,
            "Digest username=\"dev\", realm=\"3402000000\", nonce=\"42\", uri=\"sip:1.2.3.4:5060\", response=\"abcd\""
        );
    }
}
