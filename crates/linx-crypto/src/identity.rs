//! Identity management using X25519
//!
//! The static public key is the node identifier. Shared keys between two
//! identities are symmetric: both sides derive the same bytes.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey as DalekPublicKey, StaticSecret};

use linx_core::{LinxError, LinxResult, PublicKey};

use crate::KEY_SIZE;

const SHARED_KEY_INFO: &[u8] = b"LINX_OFFER_KEY_v0";

/// Identity keypair for a peer
#[derive(Clone)]
pub struct Identity {
    secret: StaticSecret,
    public_key: PublicKey,
}

impl Identity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self::from_secret(StaticSecret::random_from_rng(OsRng))
    }

    /// Create identity from existing secret key bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self::from_secret(StaticSecret::from(bytes))
    }

    fn from_secret(secret: StaticSecret) -> Self {
        let public_key = PublicKey::from_bytes(DalekPublicKey::from(&secret).to_bytes());
        Identity { secret, public_key }
    }

    /// Get the secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key (node identifier)
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Derive the symmetric key shared with `peer`.
    ///
    /// X25519 output is run through HKDF-SHA256, salted with both public keys
    /// in sorted order so either side computes the same salt.
    pub fn shared_key(&self, peer: &PublicKey) -> LinxResult<[u8; KEY_SIZE]> {
        let shared = self
            .secret
            .diffie_hellman(&DalekPublicKey::from(peer.to_bytes()));

        // Low-order points yield an all-zero secret.
        if !shared.was_contributory() {
            return Err(LinxError::InvalidKey);
        }

        let (lo, hi) = if self.public_key <= *peer {
            (self.public_key, *peer)
        } else {
            (*peer, self.public_key)
        };
        let mut salt = [0u8; 64];
        salt[..32].copy_from_slice(lo.as_bytes());
        salt[32..].copy_from_slice(hi.as_bytes());

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        hkdf.expand(SHARED_KEY_INFO, &mut key)
            .map_err(|_| LinxError::InvalidKey)?;
        Ok(key)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
