//! Sealed offer envelopes - wire envelope + crypto binding
//!
//! An envelope carries `{ciphertext, nonce, sender}` across the untrusted
//! relay. The AEAD key comes from the sender/recipient shared key and the
//! associated data is `sender || recipient`, so an envelope cannot be
//! redirected to a different recipient or attributed to a different sender.

use linx_core::{LinxResult, PublicKey};
use linx_wire::Envelope;
use tracing::trace;

use crate::{generate_nonce, AeadCipher, Identity};

/// Encrypt `plaintext` from `identity` to `recipient` under a fresh nonce
pub fn seal(identity: &Identity, recipient: &PublicKey, plaintext: &[u8]) -> LinxResult<Envelope> {
    let key = identity.shared_key(recipient)?;
    let cipher = AeadCipher::new(&key);
    let sender = identity.public_key();
    let nonce = generate_nonce();

    let ciphertext = cipher.encrypt(&nonce, &binding(&sender, recipient), plaintext)?;
    trace!(to = %recipient.short(), len = ciphertext.len(), "sealed envelope");

    Ok(Envelope {
        ciphertext,
        nonce,
        sender,
    })
}

/// Decrypt an envelope addressed to `identity`
pub fn open(identity: &Identity, envelope: &Envelope) -> LinxResult<Vec<u8>> {
    let key = identity.shared_key(&envelope.sender)?;
    let cipher = AeadCipher::new(&key);
    let aad = binding(&envelope.sender, &identity.public_key());
    cipher.decrypt(&envelope.nonce, &aad, &envelope.ciphertext)
}

fn binding(sender: &PublicKey, recipient: &PublicKey) -> [u8; 64] {
    let mut aad = [0u8; 64];
    aad[..32].copy_from_slice(sender.as_bytes());
    aad[32..].copy_from_slice(recipient.as_bytes());
    aad
}
