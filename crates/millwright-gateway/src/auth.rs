//! API-key authentication for the HTTP surface.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use millwright_core::config::MillwrightConfig;

type HmacSha256 = Hmac<Sha256>;

/// True when the request may proceed: either no API key is configured, or
/// `X-Api-Key` matches it.
pub fn check_api_key(config: &MillwrightConfig, headers: &HeaderMap) -> bool {
    let Some(expected) = &config.server.api_key else {
        return true;
    };
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|provided| constant_time_eq(provided, expected))
        .unwrap_or(false)
}

/// Constant-time comparison via HMAC tags, so key checks don't leak length
/// prefixes through timing.
fn constant_time_eq(provided: &str, expected: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(expected.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(provided.as_bytes());
    let provided_tag = mac.finalize().into_bytes();

    let mut reference = HmacSha256::new_from_slice(expected.as_bytes())
        .expect("HMAC accepts any key length");
    reference.update(expected.as_bytes());
    reference.verify_slice(&provided_tag).is_ok()
}
