//! # Webhook Signature Verification
//!
//! The provider signs each delivery with `t=<unix>,v1=<hex hmac>` over
//! `"{timestamp}.{body}"`. Verification happens before anything touches
//! the store: a bad signature is terminal and security-relevant.

use checkout_core::{CheckoutError, CheckoutResult};
use chrono::Utc;

/// Maximum clock skew accepted between the provider's timestamp and ours
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> CheckoutResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let kv: Vec<&str> = part.split('=').collect();
        if kv.len() != 2 {
            continue;
        }
        match kv[0] {
            "t" => {
                timestamp = kv[1].parse().ok();
            }
            "v1" => {
                signatures.push(kv[1].to_string());
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        CheckoutError::Verification("missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(CheckoutError::Verification(
            "no v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

pub(crate) fn compute_hmac_sha256(secret: &str, message: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Verify a delivery's authenticity. Checks timestamp tolerance first,
/// then compares the expected HMAC against every `v1` candidate in
/// constant time.
pub fn verify(secret: &str, payload: &[u8], signature_header: &str) -> CheckoutResult<()> {
    let header = parse_signature_header(signature_header)?;

    let now = Utc::now().timestamp();
    if (now - header.timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(CheckoutError::Verification(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let signed_payload = format!("{}.{}", header.timestamp, String::from_utf8_lossy(payload));
    let expected = compute_hmac_sha256(secret, &signed_payload);

    let valid = header
        .signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected));

    if !valid {
        return Err(CheckoutError::Verification("signature mismatch".to_string()));
    }

    Ok(())
}

/// Build a valid signature header for a payload. Used by tests and by
/// local delivery tooling.
pub fn sign(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    format!(
        "t={},v1={}",
        timestamp,
        compute_hmac_sha256(secret, &signed_payload)
    )
}
