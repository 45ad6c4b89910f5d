use base64::engine::general_purpose;
use base64::Engine;

use crate::config::Credentials;

/// Check an extracted `Proxy-Authorization` value against the configured
/// credentials.
///
/// A connection that carries no header at all is authorized: the gate only
/// enforces credentials when a header is actually present. This is a
/// documented behavior of the proxy, not an oversight.
///
/// A present header must be `Basic <base64>` where the decoded payload is
/// `username:password` matching the configuration exactly.
pub fn authorize(credentials: &Credentials, header: Option<&str>) -> bool {
    let Some(header) = header else {
        return true;
    };

    let mut parts = header.split_whitespace();
    if parts.next() != Some("Basic") {
        return false;
    }
    let Some(encoded) = parts.next() else {
        return false;
    };

    let Ok(decoded) = general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((username, password)) = decoded.split_once(':') else {
        return false;
    };

    username == credentials.username && password == credentials.password
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }

    fn basic(payload: &str) -> String {
        format!("Basic {}", general_purpose::STANDARD.encode(payload))
    }

    #[test]
    fn test_absent_header_is_authorized() {
        assert!(authorize(&credentials(), None));
    }

    #[test]
    fn test_matching_credentials_authorized() {
        assert!(authorize(&credentials(), Some(&basic("user:pass"))));
    }

    #[test]
    fn test_wrong_password_rejected() {
        assert!(!authorize(&credentials(), Some(&basic("user:wrong"))));
    }

    #[test]
    fn test_wrong_username_rejected() {
        assert!(!authorize(&credentials(), Some(&basic("other:pass"))));
    }

    #[test]
    fn test_non_basic_scheme_rejected() {
        assert!(!authorize(&credentials(), Some("Bearer dXNlcjpwYXNz")));
    }

    #[test]
    fn test_missing_payload_rejected() {
        assert!(!authorize(&credentials(), Some("Basic")));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(!authorize(&credentials(), Some("Basic !!!not-base64!!!")));
    }

    #[test]
    fn test_payload_without_separator_rejected() {
        assert!(!authorize(&credentials(), Some(&basic("userpass"))));
    }

    #[test]
    fn test_password_containing_colon() {
        let creds = Credentials {
            username: "user".to_string(),
            password: "pa:ss".to_string(),
        };
        assert!(authorize(&creds, Some(&basic("user:pa:ss"))));
    }
}
