//! Caller identity. Full authentication (JWT decoding, OIDC, sessions) is
//! external plumbing; this crate only needs the resulting wallet address,
//! passed through by whatever sits in front of it.

use axum::http::HeaderMap;

use crate::error::ApiError;

pub const USER_ADDRESS_HEADER: &str = "x-user-address";

/// Extracts and validates the caller's wallet address from the inbound
/// request. Address format only (`0x` + 40 hex chars) is checked here —
/// signature/session verification happens upstream of this service.
pub fn extract_user_address(headers: &HeaderMap) -> Result<String, ApiError> {
    let raw = headers
        .get(USER_ADDRESS_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if is_valid_address(raw) {
        Ok(raw.to_lowercase())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn is_valid_address(value: &str) -> bool {
    value.len() == 42 && value.starts_with("0x") && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_address_is_lowercased() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ADDRESS_HEADER, "0xABCDEF0123456789ABCDEF0123456789ABCDEF01".parse().unwrap());
        let addr = extract_user_address(&headers).unwrap();
        assert_eq!(addr, "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(extract_user_address(&headers).is_err());
    }

    #[test]
    fn malformed_address_is_unauthorized() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ADDRESS_HEADER, "not-an-address".parse().unwrap());
        assert!(extract_user_address(&headers).is_err());
    }
}
