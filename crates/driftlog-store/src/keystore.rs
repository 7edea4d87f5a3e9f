//! Signing identities and signature verification.
//!
//! Entries are signed with ed25519. A [`Signer`] is the private half owned
//! by the local replica; the [`Keystore`] trait is the verification seam the
//! log uses to check incoming entries, so alternative key backends can be
//! plugged in without touching the log itself.

use std::fmt;

use driftlog_types::hex;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};

/// Trait for verifying entry signatures against opaque key identities.
///
/// Key identities and signatures travel through the log as canonical hex
/// strings, which is also how they appear in serialized entries.
pub trait Keystore: Send + Sync {
    /// Verify `sig` over `bytes` for the given public key identity.
    ///
    /// Returns `false` for malformed keys or signatures rather than
    /// erroring: a garbled credential is indistinguishable from a forged one.
    fn verify(&self, public_key: &str, sig: &str, bytes: &[u8]) -> bool;
}

/// A signing identity owned by the local replica.
#[derive(Clone)]
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self::from_seed(rand::random())
    }

    /// Derive an identity from a 32-byte seed. Deterministic, used in tests.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The public key identity, canonical hex encoding.
    pub fn public_key(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign the given bytes, returning the signature as hex.
    pub fn sign(&self, bytes: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(bytes);
        hex::encode(signature.to_bytes())
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the private half.
        f.debug_struct("Signer")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// Keystore that verifies ed25519 signatures from raw public keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Keystore;

impl Ed25519Keystore {
    /// Create the default ed25519 keystore.
    pub fn new() -> Self {
        Self
    }
}

impl Keystore for Ed25519Keystore {
    fn verify(&self, public_key: &str, sig: &str, bytes: &[u8]) -> bool {
        let Ok(key_bytes) = hex::decode(public_key) else {
            return false;
        };
        let Ok(key_array) = <[u8; 32]>::try_from(key_bytes) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_array) else {
            return false;
        };

        let Ok(sig_bytes) = hex::decode(sig) else {
            return false;
        };
        let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes) else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_array);

        verifying_key.verify(bytes, &signature).is_ok()
    }
}
