//! Default [`CryptoProvider`](super::CryptoProvider) backed by RustCrypto's
//! `md-5` and `rsa` crates.

use md5::{Digest, Md5};
use crypto_bigint::modular::BoxedMontyForm;
use crypto_bigint::BoxedUint;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};

use super::{CryptoProvider, RsaMode};
use crate::error::{Result, RtspError};

/// RSA/MD5 implementation wrapping a single private key.
///
/// The key is the same one used for both RSA operations: PKCS#1
/// padded decryption for `a=rsaaeskey` (`RsaMode::Key`), and a raw,
/// unpadded private-key exponentiation for the Apple-Challenge response
/// (`RsaMode::Auth`) — the iOS client pre-pads the challenge itself, so a
/// second padding layer here would corrupt it.
pub struct DefaultCryptoProvider {
    private_key: RsaPrivateKey,
}

impl DefaultCryptoProvider {
    /// Load a PKCS#1 PEM-encoded RSA private key.
    pub fn from_pkcs1_pem(pem: &str) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|err| RtspError::Resource(format!("invalid RSA private key: {err}")))?;
        Ok(Self { private_key })
    }

    /// Raw `m^d mod n`, left-padded to the key's byte length.
    ///
    /// The Apple-Challenge scheme's idea of "sign" — there is no hash or
    /// ASN.1 wrapper, just the modular exponentiation it expects.
    fn raw_private_op(&self, data: &[u8]) -> Vec<u8> {
        let key_size = self.private_key.size();
        let n_params = self.private_key.n_params();
        let m = BoxedUint::from_be_slice_vartime(data).widen(n_params.bits_precision());
        let c = BoxedMontyForm::new(m, n_params)
            .pow(self.private_key.d())
            .retrieve();
        let mut out = c.to_be_bytes_trimmed_vartime().to_vec();
        if out.len() < key_size {
            let mut padded = vec![0u8; key_size - out.len()];
            padded.append(&mut out);
            out = padded;
        }
        out
    }
}

impl CryptoProvider for DefaultCryptoProvider {
    fn md5(&self, data: &[u8]) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(data);
        hasher.finalize().into()
    }

    fn rsa_apply(&self, data: &[u8], mode: RsaMode) -> Result<Vec<u8>> {
        match mode {
            RsaMode::Key => self.private_key.decrypt(Pkcs1v15Encrypt, data).map_err(|err| {
                RtspError::InvalidParameters(format!("rsaaeskey decrypt failed: {err}"))
            }),
            RsaMode::Auth => Ok(self.raw_private_op(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPublicKey;

    fn test_provider() -> DefaultCryptoProvider {
        let mut rng = rand::rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, 1024).expect("generate test RSA key");
        DefaultCryptoProvider { private_key }
    }

    #[test]
    fn md5_matches_known_vector() {
        let provider = test_provider();
        let digest = provider.md5(b"abc");
        assert_eq!(
            digest,
            [
                0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28,
                0xe1, 0x7f, 0x72
            ]
        );
    }

    #[test]
    fn rsa_key_mode_round_trips_through_pkcs1v15() {
        let provider = test_provider();
        let public_key = RsaPublicKey::from(&provider.private_key);
        let mut rng = rand::rng();
        let plaintext = b"16-byte-aes-key!";
        let ciphertext = public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
            .unwrap();

        let recovered = provider.rsa_apply(&ciphertext, RsaMode::Key).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn rsa_auth_mode_is_left_padded_to_key_size() {
        let provider = test_provider();
        let challenge = vec![0x42u8; provider.private_key.size()];
        let signed = provider.rsa_apply(&challenge, RsaMode::Auth).unwrap();
        assert_eq!(signed.len(), provider.private_key.size());
    }
}
