//! Cryptographic primitives
//!
//! - **Signatures**: Ed25519 over message plaintext
//! - **Key agreement**: X25519, expanded with HKDF-SHA256
//! - **Symmetric tokens**: AES-256-CBC with PKCS#7 padding, authenticated
//!   with HMAC-SHA256 over `iv || ciphertext` (encrypt-then-MAC)
//!
//! Token layout:
//! ```text
//! [ 16 bytes: IV ]
//! [ N bytes: ciphertext (multiple of 16) ]
//! [ 32 bytes: HMAC-SHA256 ]
//! ```

use crate::{Result, RoutingError};
use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zrp_proto::{PublicKey, SIGNATURE_LENGTH};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const IV_LENGTH: usize = 16;
const MAC_LENGTH: usize = 32;
const BLOCK_LENGTH: usize = 16;

const KDF_SALT: &[u8] = b"zrp-shared-key-v1";
const KDF_INFO: &[u8] = b"zrp-message-token";

/// Symmetric key material derived from a Diffie-Hellman secret
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey {
    mac_key: [u8; 32],
    enc_key: [u8; 32],
}

impl SharedKey {
    /// Expand a raw shared secret into MAC and encryption keys
    pub fn derive(secret: &[u8]) -> Result<Self> {
        let hkdf = Hkdf::<Sha256>::new(Some(KDF_SALT), secret);
        let mut okm = [0u8; 64];
        hkdf.expand(KDF_INFO, &mut okm)
            .map_err(|e| RoutingError::Crypto(format!("Key derivation failed: {}", e)))?;

        let mut mac_key = [0u8; 32];
        let mut enc_key = [0u8; 32];
        mac_key.copy_from_slice(&okm[..32]);
        enc_key.copy_from_slice(&okm[32..]);

        Ok(Self { mac_key, enc_key })
    }

    fn mac(&self) -> Result<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(&self.mac_key)
            .map_err(|e| RoutingError::Crypto(format!("Invalid MAC key: {}", e)))
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Validate a compressed public key
///
/// Fails if the length is wrong or the signing half is not a valid
/// Ed25519 point.
pub fn public_key_from_compressed(bytes: &[u8]) -> Result<PublicKey> {
    let key = PublicKey::from_compressed(bytes)?;
    VerifyingKey::from_bytes(&key.signing)
        .map_err(|e| RoutingError::Crypto(format!("Invalid public key: {}", e)))?;
    Ok(key)
}

/// Verify a signature made by the holder of `public_key`
pub fn verify(data: &[u8], signature: &[u8], public_key: &PublicKey) -> Result<()> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(RoutingError::Crypto(format!(
            "Signature must be {} bytes",
            SIGNATURE_LENGTH
        )));
    }

    let verifying_key = VerifyingKey::from_bytes(&public_key.signing)
        .map_err(|e| RoutingError::Crypto(format!("Invalid public key: {}", e)))?;

    let mut sig_bytes = [0u8; SIGNATURE_LENGTH];
    sig_bytes.copy_from_slice(signature);
    let sig = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(data, &sig)
        .map_err(|e| RoutingError::Crypto(format!("Signature verification failed: {}", e)))
}

/// Encrypt and authenticate `plaintext`
pub fn symmetric_encrypt<R: RngCore + ?Sized>(
    rng: &mut R,
    plaintext: &[u8],
    key: &SharedKey,
) -> Result<Vec<u8>> {
    let mut iv = [0u8; IV_LENGTH];
    rng.fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new_from_slices(&key.enc_key, &iv)
        .map_err(|e| RoutingError::Crypto(format!("Cipher setup failed: {}", e)))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut mac = key.mac()?;
    mac.update(&iv);
    mac.update(&ciphertext);
    let tag = mac.finalize().into_bytes();

    let mut token = Vec::with_capacity(IV_LENGTH + ciphertext.len() + MAC_LENGTH);
    token.extend_from_slice(&iv);
    token.extend_from_slice(&ciphertext);
    token.extend_from_slice(&tag);
    Ok(token)
}

/// Authenticate and decrypt a token produced by [`symmetric_encrypt`]
pub fn symmetric_decrypt(token: &[u8], key: &SharedKey) -> Result<Vec<u8>> {
    if token.len() < IV_LENGTH + BLOCK_LENGTH + MAC_LENGTH {
        return Err(RoutingError::Crypto("Token too short".to_string()));
    }

    let (iv, rest) = token.split_at(IV_LENGTH);
    let (ciphertext, tag) = rest.split_at(rest.len() - MAC_LENGTH);

    if ciphertext.len() % BLOCK_LENGTH != 0 {
        return Err(RoutingError::Crypto("Ciphertext not block aligned".to_string()));
    }

    let mut mac = key.mac()?;
    mac.update(iv);
    mac.update(ciphertext);
    mac.verify_slice(tag)
        .map_err(|_| RoutingError::Crypto("Token authentication failed".to_string()))?;

    Aes256CbcDec::new_from_slices(&key.enc_key, iv)
        .map_err(|e| RoutingError::Crypto(format!("Cipher setup failed: {}", e)))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| RoutingError::Crypto("Invalid padding".to_string()))
}
