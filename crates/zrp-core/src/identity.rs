//! Device identity management

use crate::crypto::SharedKey;
use crate::{Result, RoutingError};
use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use std::fs;
use std::path::Path;
use x25519_dalek::StaticSecret;
use zrp_proto::{Identifier, PublicKey};

/// Length of serialized key pair secrets
pub const KEY_PAIR_LENGTH: usize = 64;

/// Length of a serialized identity (identifier + key pair)
pub const IDENTITY_LENGTH: usize = 16 + KEY_PAIR_LENGTH;

/// A device key pair (Ed25519 signing key + X25519 static secret)
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    exchange_secret: StaticSecret,
}

impl KeyPair {
    /// Generate a new key pair from the given randomness source
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut secret_bytes = [0u8; KEY_PAIR_LENGTH];
        rng.fill_bytes(&mut secret_bytes);

        Self::from_secrets(&secret_bytes)
    }

    /// Create key pair from existing secret bytes
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        if secret.len() != KEY_PAIR_LENGTH {
            return Err(RoutingError::Identity(format!(
                "Key pair must be {} bytes",
                KEY_PAIR_LENGTH
            )));
        }

        let mut secret_bytes = [0u8; KEY_PAIR_LENGTH];
        secret_bytes.copy_from_slice(secret);

        Ok(Self::from_secrets(&secret_bytes))
    }

    fn from_secrets(secret: &[u8; KEY_PAIR_LENGTH]) -> Self {
        let mut signing = [0u8; 32];
        let mut exchange = [0u8; 32];
        signing.copy_from_slice(&secret[..32]);
        exchange.copy_from_slice(&secret[32..]);

        Self {
            signing_key: SigningKey::from_bytes(&signing),
            exchange_secret: StaticSecret::from(exchange),
        }
    }

    /// Get the secret bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(KEY_PAIR_LENGTH);
        bytes.extend_from_slice(&self.signing_key.to_bytes());
        bytes.extend_from_slice(&self.exchange_secret.to_bytes());
        bytes
    }

    /// Get the public half
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            signing: self.signing_key.verifying_key().to_bytes(),
            exchange: x25519_dalek::PublicKey::from(&self.exchange_secret).to_bytes(),
        }
    }

    /// Sign data
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let signature = self.signing_key.sign(data);
        signature.to_bytes().to_vec()
    }

    /// Derive the symmetric key shared with a peer
    ///
    /// Both sides obtain the same key: `a.shared_key(b.pub) == b.shared_key(a.pub)`.
    pub fn shared_key(&self, peer: &PublicKey) -> Result<SharedKey> {
        let peer_exchange = x25519_dalek::PublicKey::from(peer.exchange);
        let secret = self.exchange_secret.diffie_hellman(&peer_exchange);

        if !secret.was_contributory() {
            return Err(RoutingError::Crypto(
                "Peer exchange key is a low-order point".to_string(),
            ));
        }

        SharedKey::derive(secret.as_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_key().fingerprint())
            .finish()
    }
}

/// A device identity: random identifier plus key pair, kept for the
/// device's lifetime
#[derive(Clone)]
pub struct Identity {
    id: Identifier,
    keys: KeyPair,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let id = Identifier::random(rng);
        let keys = KeyPair::generate(rng);
        Self { id, keys }
    }

    /// Assemble an identity from parts
    pub fn new(id: Identifier, keys: KeyPair) -> Self {
        Self { id, keys }
    }

    /// Create identity from serialized bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != IDENTITY_LENGTH {
            return Err(RoutingError::Identity(format!(
                "Identity must be {} bytes",
                IDENTITY_LENGTH
            )));
        }

        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&bytes[..16]);
        let id = Identifier::from_bytes(id_bytes);
        if id.is_nil() {
            return Err(RoutingError::Identity("Identifier is nil".to_string()));
        }

        let keys = KeyPair::from_bytes(&bytes[16..])?;
        Ok(Self { id, keys })
    }

    /// Serialize identifier and secrets
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(IDENTITY_LENGTH);
        bytes.extend_from_slice(self.id.as_bytes());
        bytes.extend_from_slice(&self.keys.to_bytes());
        bytes
    }

    /// Device identifier
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Device key pair
    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Device public key
    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    /// Save identity to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Load identity from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id.to_string())
            .field("public", &self.keys.public_key().fingerprint())
            .finish()
    }
}
