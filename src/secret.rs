use crate::errors::CryptoError;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce};
use scrypt::Params;
use std::fmt;
use std::str::FromStr;

// AES-256-GCM with the 16-byte IV the stored payloads were written with.
type Cipher = AesGcm<Aes256, U16>;

const IV_LENGTH: usize = 16;
const TAG_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;

// Fixed, non-secret salt for the passphrase fallback. Weaker than a
// per-secret salt; operators should supply a 64-hex pre-generated key.
const DERIVE_SALT: &[u8] = b"salt";

/// A 32-byte symmetric key. Constructed explicitly and threaded through the
/// registry; never read from a global.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial([u8; KEY_LENGTH]);

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Decodes an explicit 64-hex-character key.
    pub fn from_hex(raw: &str) -> Result<Self, CryptoError> {
        let decoded = hex::decode(raw)
            .map_err(|_| CryptoError::Key("key is not valid hex".to_string()))?;
        let bytes: [u8; KEY_LENGTH] = decoded
            .try_into()
            .map_err(|_| CryptoError::Key(format!("key must be {} bytes", KEY_LENGTH)))?;
        Ok(Self(bytes))
    }

    /// Accepts either a pre-generated high-entropy key (exactly 64 hex
    /// characters, decoded directly) or an arbitrary passphrase, which is
    /// stretched with scrypt (N=2^14, r=8, p=1) over the fixed salt.
    pub fn derive(secret: &str) -> Result<Self, CryptoError> {
        if secret.len() == KEY_LENGTH * 2 && secret.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::from_hex(secret);
        }

        let params = Params::new(14, 8, 1, KEY_LENGTH)
            .map_err(|error| CryptoError::Key(error.to_string()))?;
        let mut output = [0u8; KEY_LENGTH];
        scrypt::scrypt(secret.as_bytes(), DERIVE_SALT, &params, &mut output)
            .map_err(|error| CryptoError::Key(error.to_string()))?;
        Ok(Self(output))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial([redacted])")
    }
}

/// Textual wire format: `<ivHex>:<cipherHex>:<tagHex>`. Segment order is a
/// fixed contract; parsers reject anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    iv: [u8; IV_LENGTH],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_LENGTH],
}

impl fmt::Display for EncryptedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            hex::encode(self.iv),
            hex::encode(&self.ciphertext),
            hex::encode(self.tag)
        )
    }
}

impl FromStr for EncryptedPayload {
    type Err = CryptoError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = raw.split(':').collect();
        if segments.len() != 3 {
            return Err(CryptoError::Format(
                "expected 3 colon-separated segments".to_string(),
            ));
        }

        let iv_bytes = hex::decode(segments[0])
            .map_err(|_| CryptoError::Format("iv segment is not valid hex".to_string()))?;
        let ciphertext = hex::decode(segments[1])
            .map_err(|_| CryptoError::Format("ciphertext segment is not valid hex".to_string()))?;
        let tag_bytes = hex::decode(segments[2])
            .map_err(|_| CryptoError::Format("tag segment is not valid hex".to_string()))?;

        let iv: [u8; IV_LENGTH] = iv_bytes
            .try_into()
            .map_err(|_| CryptoError::Format(format!("iv must be {} bytes", IV_LENGTH)))?;
        let tag: [u8; TAG_LENGTH] = tag_bytes
            .try_into()
            .map_err(|_| CryptoError::Format(format!("tag must be {} bytes", TAG_LENGTH)))?;

        Ok(Self { iv, ciphertext, tag })
    }
}

/// Reversible, authenticated protection of a single secret string.
#[derive(Clone)]
pub struct SecretCodec {
    key: KeyMaterial,
}

impl SecretCodec {
    pub fn new(key: KeyMaterial) -> Self {
        Self { key }
    }

    /// Encrypts with a fresh random IV per call; identical plaintext never
    /// produces identical ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedPayload, CryptoError> {
        let iv: [u8; IV_LENGTH] = rand::random();
        let cipher = Cipher::new(Key::<Cipher>::from_slice(&self.key.0));

        let mut sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CryptoError::Key("encryption failed".to_string()))?;

        // The aead API appends the tag to the ciphertext; the wire format
        // keeps them as separate segments.
        let split_at = sealed.len() - TAG_LENGTH;
        let tag_bytes = sealed.split_off(split_at);
        let tag: [u8; TAG_LENGTH] = tag_bytes
            .try_into()
            .map_err(|_| CryptoError::Key("unexpected tag length".to_string()))?;

        Ok(EncryptedPayload {
            iv,
            ciphertext: sealed,
            tag,
        })
    }

    /// Fails closed: a wrong key, corrupted segment, or tampered tag yields
    /// `AuthenticationError`, never partial plaintext.
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<String, CryptoError> {
        let cipher = Cipher::new(Key::<Cipher>::from_slice(&self.key.0));

        let mut sealed = payload.ciphertext.clone();
        sealed.extend_from_slice(&payload.tag);

        let plaintext = cipher
            .decrypt(Nonce::<U16>::from_slice(&payload.iv), sealed.as_ref())
            .map_err(|_| CryptoError::Authentication)?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Format("plaintext is not valid UTF-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{EncryptedPayload, KeyMaterial, SecretCodec};
    use crate::errors::CryptoError;
    use std::str::FromStr;

    fn codec() -> SecretCodec {
        SecretCodec::new(KeyMaterial::from_bytes([7u8; 32]))
    }

    #[test]
    fn round_trip_preserves_plaintext() {
        let codec = codec();
        let payload = codec.encrypt("secret123").expect("encrypt");
        let recovered = codec.decrypt(&payload).expect("decrypt");
        assert_eq!(recovered, "secret123");
    }

    #[test]
    fn wire_format_survives_reparse() {
        let codec = codec();
        let payload = codec.encrypt("postgresql://app:pw@db/sales").expect("encrypt");
        let reparsed = EncryptedPayload::from_str(&payload.to_string()).expect("parse");
        assert_eq!(reparsed, payload);
        assert_eq!(codec.decrypt(&reparsed).expect("decrypt"), "postgresql://app:pw@db/sales");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let payload = codec().encrypt("secret123").expect("encrypt");
        let other = SecretCodec::new(KeyMaterial::from_bytes([8u8; 32]));
        let err = other.decrypt(&payload).expect_err("wrong key must fail");
        assert_eq!(err, CryptoError::Authentication);
    }

    #[test]
    fn fresh_iv_makes_encryption_nondeterministic() {
        let codec = codec();
        let first = codec.encrypt("same plaintext").expect("encrypt");
        let second = codec.encrypt("same plaintext").expect("encrypt");
        assert_ne!(first.to_string(), second.to_string());
        assert_eq!(codec.decrypt(&first).expect("decrypt"), "same plaintext");
        assert_eq!(codec.decrypt(&second).expect("decrypt"), "same plaintext");
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let codec = codec();
        let payload = codec.encrypt("secret123").expect("encrypt");
        let mut raw = payload.to_string();
        // Flip a nibble in the ciphertext segment.
        let colon = raw.find(':').expect("first colon") + 1;
        let target = raw.as_bytes()[colon];
        let replacement = if target == b'0' { '1' } else { '0' };
        raw.replace_range(colon..colon + 1, &replacement.to_string());
        let tampered = EncryptedPayload::from_str(&raw).expect("still well-formed");
        let err = codec.decrypt(&tampered).expect_err("tamper must fail");
        assert_eq!(err, CryptoError::Authentication);
    }

    #[test]
    fn malformed_payloads_are_format_errors() {
        for raw in ["not-a-payload", "only:two", "not:a:validpayload"] {
            let err = EncryptedPayload::from_str(raw).expect_err("must reject");
            assert!(matches!(err, CryptoError::Format(_)), "{raw} -> {err:?}");
        }
    }

    #[test]
    fn sixty_four_hex_chars_decode_directly() {
        let raw = "a".repeat(64);
        let derived = KeyMaterial::derive(&raw).expect("derive");
        let decoded = KeyMaterial::from_hex(&raw).expect("from_hex");
        assert_eq!(derived, decoded);
    }

    #[test]
    fn passphrase_derivation_is_deterministic() {
        let first = KeyMaterial::derive("correct horse battery staple").expect("derive");
        let second = KeyMaterial::derive("correct horse battery staple").expect("derive");
        assert_eq!(first, second);
        let other = KeyMaterial::derive("a different passphrase").expect("derive");
        assert_ne!(first, other);
    }

    #[test]
    fn derived_keys_interoperate_across_codecs() {
        let writer = SecretCodec::new(KeyMaterial::derive("shared passphrase").expect("derive"));
        let reader = SecretCodec::new(KeyMaterial::derive("shared passphrase").expect("derive"));
        let payload = writer.encrypt("secret123").expect("encrypt");
        assert_eq!(reader.decrypt(&payload).expect("decrypt"), "secret123");
    }
}
