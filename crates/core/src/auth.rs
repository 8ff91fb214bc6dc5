//! Apple-Challenge response and HTTP Digest authentication.

use base64::Engine;
use rand::Rng;

use crate::crypto::{constant_time_eq, hex_lower, CryptoProvider, RsaMode};
use crate::error::{Result, RtspError};
use crate::protocol::request::RtspRequest;

/// Build the `Apple-Response` header value for a request carrying an
/// `Apple-Challenge` header.
///
/// `local_ip` is the connection's local socket address bytes — 4 for IPv4,
/// 16 for IPv6; `hw_addr` is the 6-byte MAC advertised by config.
pub fn apple_challenge_response(
    crypto: &dyn CryptoProvider,
    challenge_b64: &str,
    local_ip: &[u8],
    hw_addr: [u8; 6],
) -> Result<String> {
    let challenge = base64::engine::general_purpose::STANDARD
        .decode(challenge_b64)
        .map_err(|_| {
            RtspError::InvalidParameters("Apple-Challenge is not valid base64".to_string())
        })?;
    if challenge.len() > 16 {
        return Err(RtspError::InvalidParameters(
            "Apple-Challenge decodes to more than 16 bytes".to_string(),
        ));
    }

    let mut plaintext = Vec::with_capacity(32);
    plaintext.extend_from_slice(&challenge);
    plaintext.extend_from_slice(local_ip);
    plaintext.extend_from_slice(&hw_addr);
    // `challenge || local_ip || hw_addr` goes at the front; the buffer is
    // only ever extended to 32 bytes with trailing zeros, never left-padded.
    if plaintext.len() < 32 {
        plaintext.resize(32, 0);
    }

    let signed = crypto.rsa_apply(&plaintext, RsaMode::Auth)?;
    Ok(base64::engine::general_purpose::STANDARD_NO_PAD.encode(signed))
}

/// Generate an 8-byte random nonce, rendered as lowercase hex, on first
/// sight of a connection with Digest enabled.
pub fn generate_nonce() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parsed `Authorization: Digest ...` header fields needed to verify a
/// client's response hash.
#[derive(Debug, Default)]
struct DigestHeader {
    username: Option<String>,
    realm: Option<String>,
    nonce: Option<String>,
    uri: Option<String>,
    response: Option<String>,
}

fn parse_digest_header(value: &str) -> Option<DigestHeader> {
    let rest = value.strip_prefix("Digest ")?;
    let mut header = DigestHeader::default();
    for field in split_digest_fields(rest) {
        let (key, val) = field.split_once('=')?;
        let val = val.trim().trim_matches('"').to_string();
        match key.trim() {
            "username" => header.username = Some(val),
            "realm" => header.realm = Some(val),
            "nonce" => header.nonce = Some(val),
            "uri" => header.uri = Some(val),
            "response" => header.response = Some(val),
            _ => {}
        }
    }
    Some(header)
}

/// Split on commas that are not inside a quoted value.
fn split_digest_fields(rest: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in rest.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(rest[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(rest[start..].trim());
    fields
}

/// Verify a request's `Authorization: Digest` header against `password`
/// and the connection's `nonce`.
///
/// Recomputes `MD5(MD5(username:realm:password):nonce:MD5(method:uri))`
/// with both intermediate digests rendered as 32 lowercase hex characters
/// before the outer MD5, and compares in constant time.
pub fn verify_digest(
    crypto: &dyn CryptoProvider,
    request: &RtspRequest,
    password: &str,
    nonce: &str,
) -> bool {
    let Some(auth_header) = request.header("Authorization") else {
        return false;
    };
    let Some(header) = parse_digest_header(auth_header) else {
        return false;
    };
    let (Some(username), Some(realm), Some(uri), Some(client_response)) = (
        header.username.as_deref(),
        header.realm.as_deref(),
        header.uri.as_deref(),
        header.response.as_deref(),
    ) else {
        return false;
    };
    if header.nonce.as_deref() != Some(nonce) {
        return false;
    }

    let ha1 = hex_lower(&crypto.md5(format!("{username}:{realm}:{password}").as_bytes()));
    let ha2 = hex_lower(&crypto.md5(format!("{}:{uri}", request.method).as_bytes()));
    let expected = hex_lower(&crypto.md5(format!("{ha1}:{nonce}:{ha2}").as_bytes()));

    constant_time_eq(expected.as_bytes(), client_response.as_bytes())
}
