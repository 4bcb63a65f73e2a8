//! Identifier and public key value types

use crate::{ProtocolError, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of a compressed public key (Ed25519 verifying key + X25519 key)
pub const PUBLIC_KEY_LENGTH: usize = 64;

/// 128-bit device identifier
///
/// Generated once per device from an injected randomness source and never
/// changed afterwards. Identifiers are compared by full equality and are
/// used as map keys throughout the routing engine.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(Uuid);

impl Identifier {
    /// Generate a random identifier
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }

    /// Build an identifier from four 32-bit words (most significant first)
    pub fn from_words(words: [u32; 4]) -> Self {
        let mut bytes = [0u8; 16];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        Self(Uuid::from_bytes(bytes))
    }

    /// The four 32-bit words of this identifier
    pub fn as_words(&self) -> [u32; 4] {
        let bytes = self.0.as_bytes();
        let mut words = [0u32; 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }

    /// Create identifier from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// The all-zero identifier is never assigned to a device
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl FromStr for Identifier {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s).map_err(|_| ProtocolError::InvalidIdentifier)?;
        Ok(Self(uuid))
    }
}

/// Public half of a device key pair
///
/// `signing` is an Ed25519 verifying key, `exchange` an X25519 public key
/// used for shared-secret derivation. Copied freely as a value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    /// Ed25519 verifying key
    pub signing: [u8; 32],

    /// X25519 key agreement key
    pub exchange: [u8; 32],
}

impl PublicKey {
    /// Compressed 64-byte form: signing key followed by exchange key
    pub fn to_compressed(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        bytes[..32].copy_from_slice(&self.signing);
        bytes[32..].copy_from_slice(&self.exchange);
        bytes
    }

    /// Split a compressed key into its halves
    ///
    /// Only the length is checked here; point validation belongs to the
    /// crypto layer.
    pub fn from_compressed(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(ProtocolError::InvalidBuffer(format!(
                "Public key must be {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                bytes.len()
            )));
        }

        let mut signing = [0u8; 32];
        let mut exchange = [0u8; 32];
        signing.copy_from_slice(&bytes[..32]);
        exchange.copy_from_slice(&bytes[32..]);

        Ok(Self { signing, exchange })
    }

    /// Short hex fingerprint for logs
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.signing[..8])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_identifiers_differ() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Identifier::random(&mut rng);
        let b = Identifier::random(&mut rng);

        assert_ne!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn test_seeded_identifiers_repeat() {
        let a = Identifier::random(&mut StdRng::seed_from_u64(42));
        let b = Identifier::random(&mut StdRng::seed_from_u64(42));

        assert_eq!(a, b);
    }

    #[test]
    fn test_words() {
        let words = [1, 0xdead_beef, 3, u32::MAX];
        let id = Identifier::from_words(words);

        assert_eq!(id.as_words(), words);
        assert!(Identifier::from_words([0, 0, 0, 0]).is_nil());
    }

    #[test]
    fn test_parse_identifier() {
        let id = Identifier::from_words([10, 20, 30, 40]);
        let parsed: Identifier = id.to_string().parse().unwrap();

        assert_eq!(parsed, id);
        assert!("not-an-id".parse::<Identifier>().is_err());
    }

    #[test]
    fn test_public_key_compressed() {
        let key = PublicKey {
            signing: [1u8; 32],
            exchange: [2u8; 32],
        };

        let compressed = key.to_compressed();
        assert_eq!(PublicKey::from_compressed(&compressed).unwrap(), key);
        assert!(PublicKey::from_compressed(&compressed[..63]).is_err());
    }
}
