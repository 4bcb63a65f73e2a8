//! Message construction and opening
//!
//! A message payload is encrypted under the key shared by the signer and
//! the recipient, and the signature covers the plaintext. Opening therefore
//! needs the recipient's key pair and the sender's public key.

use crate::crypto;
use crate::identity::KeyPair;
use crate::Result;
use rand::RngCore;
use zrp_proto::{Identifier, Message, PublicKey};

/// Build a message along `route`
///
/// `destination_key` belongs to the last hop of `route`.
pub fn build<R: RngCore + ?Sized>(
    rng: &mut R,
    payload: &[u8],
    route: Vec<Identifier>,
    destination_key: &PublicKey,
    signer: &KeyPair,
) -> Result<Message> {
    let shared = signer.shared_key(destination_key)?;
    let ciphertext = crypto::symmetric_encrypt(rng, payload, &shared)?;
    let signature = signer.sign(payload);

    Ok(Message {
        route,
        payload: ciphertext,
        signature,
    })
}

/// Decrypt a message addressed to `recipient` and check the sender's
/// signature over the plaintext
pub fn open(message: &Message, recipient: &KeyPair, sender_key: &PublicKey) -> Result<Vec<u8>> {
    let shared = recipient.shared_key(sender_key)?;
    let plaintext = crypto::symmetric_decrypt(&message.payload, &shared)?;
    crypto::verify(&plaintext, &message.signature, sender_key)?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Pair {
        rng: StdRng,
        sender: KeyPair,
        recipient: KeyPair,
        route: Vec<Identifier>,
    }

    fn setup() -> Pair {
        let mut rng = StdRng::seed_from_u64(21);
        let sender = KeyPair::generate(&mut rng);
        let recipient = KeyPair::generate(&mut rng);
        let route = vec![
            Identifier::random(&mut rng),
            Identifier::random(&mut rng),
        ];
        Pair {
            rng,
            sender,
            recipient,
            route,
        }
    }

    #[test]
    fn test_build_and_open() {
        let mut p = setup();
        let payload = vec![1, 2, 3, 4, 5];

        let message = build(
            &mut p.rng,
            &payload,
            p.route.clone(),
            &p.recipient.public_key(),
            &p.sender,
        )
        .unwrap();

        assert_eq!(message.route, p.route);
        assert_ne!(message.payload, payload);

        let opened = open(&message, &p.recipient, &p.sender.public_key()).unwrap();
        assert_eq!(opened, payload);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let mut p = setup();
        let mut message = build(
            &mut p.rng,
            b"hello",
            p.route.clone(),
            &p.recipient.public_key(),
            &p.sender,
        )
        .unwrap();

        let last = message.payload.len() - 1;
        message.payload[last] ^= 0xff;

        assert!(open(&message, &p.recipient, &p.sender.public_key()).is_err());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let mut p = setup();
        let mut message = build(
            &mut p.rng,
            b"hello",
            p.route.clone(),
            &p.recipient.public_key(),
            &p.sender,
        )
        .unwrap();

        message.signature[0] ^= 0xff;

        assert!(open(&message, &p.recipient, &p.sender.public_key()).is_err());
    }

    #[test]
    fn test_wrong_sender_key_rejected() {
        let mut p = setup();
        let impostor = KeyPair::generate(&mut p.rng);
        let message = build(
            &mut p.rng,
            b"hello",
            p.route.clone(),
            &p.recipient.public_key(),
            &p.sender,
        )
        .unwrap();

        assert!(open(&message, &p.recipient, &impostor.public_key()).is_err());
    }
}
