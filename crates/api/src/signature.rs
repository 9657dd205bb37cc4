//! Webhook signature verification.
//!
//! The crawler signs the raw request body with HMAC-SHA256 under the shared
//! secret and sends the hex digest in `X-Firecrawl-Signature`, optionally
//! prefixed with `sha256=`. Comparison is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use graphrag_common::ServiceError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-firecrawl-signature";

pub fn verify_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), ServiceError> {
    let provided = header.ok_or_else(|| ServiceError::Auth("missing signature header".into()))?;
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided).trim();
    let provided = hex::decode(provided)
        .map_err(|_| ServiceError::Auth("signature is not valid hex".into()))?;

    let expected = compute(secret, body);
    if bool::from(expected.as_slice().ct_eq(&provided)) {
        Ok(())
    } else {
        Err(ServiceError::Auth("signature mismatch".into()))
    }
}

/// Hex HMAC-SHA256 of `body`; the counterpart of [`verify_signature`] for
/// tests and local tooling.
pub fn sign(secret: &str, body: &[u8]) -> String {
    hex::encode(compute(secret, body))
}

fn compute(secret: &str, body: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}
