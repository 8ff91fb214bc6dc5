//! Cryptographic provider abstraction.
//!
//! The dispatcher and auth modules never reach for a specific MD5/RSA
//! crate directly — they go through [`CryptoProvider`], so the concrete
//! implementation (or a test double) can be swapped without touching
//! protocol logic.

pub mod provider;

pub use provider::DefaultCryptoProvider;

/// Selects which RSA key operation `rsa_apply` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaMode {
    /// Decrypt the AES session key carried in ANNOUNCE's `a=rsaaeskey`.
    Key,
    /// Sign the Apple-Challenge plaintext.
    Auth,
}

/// Minimal crypto surface the core depends on.
///
/// A production implementation wraps RustCrypto's `md-5` and `rsa` crates;
/// tests can substitute a fixed-output double.
pub trait CryptoProvider: Send + Sync {
    /// RFC 1321 MD5 digest.
    fn md5(&self, data: &[u8]) -> [u8; 16];

    /// Apply the receiver's RSA private key in the given mode.
    fn rsa_apply(&self, data: &[u8], mode: RsaMode) -> crate::error::Result<Vec<u8>>;
}

/// Render an MD5 digest as 32 lowercase hex characters.
pub fn hex_lower(digest: &[u8; 16]) -> String {
    let mut s = String::with_capacity(32);
    for byte in digest {
        s.push_str(&format!("{byte:02x}"));
    }
    s
}

/// Constant-time byte comparison, used to compare the client's Digest
/// `response` against the server's computed value.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
