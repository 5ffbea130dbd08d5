//! HMAC-SHA256 query signing.

use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed by `secret`.
pub fn signature(secret: &str, payload: &str) -> String {
    // HMAC accepts keys of any length, so this never fails.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Append `recvWindow`, `timestamp` and the signature over the resulting
/// query string.
pub fn sign_url(url: &mut Url, secret: &str, recv_window_ms: u64, timestamp_ms: i64) {
    url.query_pairs_mut()
        .append_pair("recvWindow", &recv_window_ms.to_string())
        .append_pair("timestamp", &timestamp_ms.to_string());
    let sig = signature(secret, url.query().unwrap_or_default());
    url.query_pairs_mut().append_pair("signature", &sig);
}
