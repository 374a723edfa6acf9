//! Item signing.
//!
//! Items tell workers to run arbitrary pipelines, so the producer signs
//! every payload with a private key only it holds, and every consumer
//! checks the signature with the matching public key.  The layout
//! matches NaCl's `crypto_sign`: the private key is the 64-byte
//! `seed ‖ public key` keypair, the public key is 32 bytes, and a
//! signed buffer is the 64-byte signature followed by the message.
//! Nothing is encrypted; payloads remain readable in the queue.
//!
//! Keys are configured as base64 strings.  An empty string disables
//! that half of the scheme (with a warning), which lets a node run
//! unsigned for local development; anything else that is not a valid
//! key is a hard error.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};

pub use ed25519_dalek::{KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Which half of the keypair a [`KeyError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyKind {
    Private,
    Public,
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyKind::Private => f.write_str("private"),
            KeyKind::Public => f.write_str("public"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeyError {
    #[error("failed to base64 decode the queue {kind} key: {source}")]
    Decode {
        kind: KeyKind,
        #[source]
        source: base64::DecodeError,
    },
    #[error("the queue {kind} key decoded to zero bytes")]
    Empty { kind: KeyKind },
    #[error("the queue {kind} key must be {expected} bytes, got {actual}")]
    Length {
        kind: KeyKind,
        expected: usize,
        actual: usize,
    },
    #[error("the queue {kind} key is not a valid ed25519 key: {source}")]
    Invalid {
        kind: KeyKind,
        #[source]
        source: ed25519_dalek::SignatureError,
    },
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SigningError {
    #[error("signed item is {length} bytes, shorter than a 64 byte signature")]
    Truncated { length: usize },
    #[error("signature verification failed; the item is corrupt or forged: {source}")]
    Forged {
        #[source]
        source: ed25519_dalek::SignatureError,
    },
}

/// The signing key material for a queue.
///
/// Either half may be absent, in which case that direction passes
/// payloads through untouched.  The keys are fixed once constructed;
/// there are no setters, and `Debug` never prints key bytes.
#[derive(Clone, Default)]
pub struct Keys {
    signing: Option<SigningKey>,
    verifying: Option<VerifyingKey>,
}

/// A freshly generated keypair, base64 encoded for configuration.
#[derive(Clone)]
pub struct GeneratedKeys {
    pub private_key: String,
    pub public_key: String,
}

impl Keys {
    /// Keys that neither sign nor verify.
    pub fn disabled() -> Self { Self::default() }

    /// Decodes the base64 private and public keys.
    ///
    /// An empty string disables the corresponding half, logging a
    /// warning.
    pub fn decode(private_key: &str, public_key: &str) -> Result<Self, KeyError> {
        let signing = match decode_key::<KEYPAIR_LENGTH>(KeyKind::Private, private_key)? {
            Some(bytes) => Some(SigningKey::from_keypair_bytes(&bytes).map_err(|source| {
                KeyError::Invalid {
                    kind: KeyKind::Private,
                    source,
                }
            })?),
            None => {
                tracing::warn!("no queue private key provided; items will be pushed unsigned");
                None
            }
        };

        let verifying = match decode_key::<PUBLIC_KEY_LENGTH>(KeyKind::Public, public_key)? {
            Some(bytes) => Some(VerifyingKey::from_bytes(&bytes).map_err(|source| {
                KeyError::Invalid {
                    kind: KeyKind::Public,
                    source,
                }
            })?),
            None => {
                tracing::warn!("no queue public key provided; popped items will not be verified");
                None
            }
        };

        Ok(Self { signing, verifying })
    }

    /// Generates a new keypair from the operating system's RNG.
    pub fn generate() -> GeneratedKeys {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);

        GeneratedKeys {
            private_key: BASE64.encode(signing.to_keypair_bytes()),
            public_key: BASE64.encode(signing.verifying_key().to_bytes()),
        }
    }

    /// Whether pushed payloads are signed.
    pub fn signs(&self) -> bool { self.signing.is_some() }

    /// Whether popped payloads are verified.
    pub fn verifies(&self) -> bool { self.verifying.is_some() }

    /// Produces the buffer to enqueue: `signature ‖ payload`, or the
    /// payload as-is when signing is disabled.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let Some(signing) = &self.signing else {
            return payload.to_vec();
        };

        let signature = signing.sign(payload);
        let mut signed = Vec::with_capacity(SIGNATURE_LENGTH + payload.len());
        signed.extend_from_slice(&signature.to_bytes());
        signed.extend_from_slice(payload);
        signed
    }

    /// Opens a signed buffer, returning the payload it carries.
    ///
    /// When verification is disabled the buffer is returned as-is.
    pub fn open<'s>(&self, signed: &'s [u8]) -> Result<&'s [u8], SigningError> {
        let Some(verifying) = &self.verifying else {
            return Ok(signed);
        };

        if signed.len() < SIGNATURE_LENGTH {
            return Err(SigningError::Truncated {
                length: signed.len(),
            });
        }

        let (signature, payload) = signed.split_at(SIGNATURE_LENGTH);
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes.copy_from_slice(signature);

        verifying
            .verify_strict(payload, &Signature::from_bytes(&bytes))
            .map_err(|source| SigningError::Forged { source })?;

        Ok(payload)
    }
}

fn decode_key<const N: usize>(kind: KeyKind, encoded: &str) -> Result<Option<[u8; N]>, KeyError> {
    if encoded.is_empty() {
        return Ok(None);
    }

    let decoded = BASE64
        .decode(encoded)
        .map_err(|source| KeyError::Decode { kind, source })?;

    if decoded.is_empty() {
        return Err(KeyError::Empty { kind });
    }

    decoded
        .try_into()
        .map(Some)
        .map_err(|decoded: Vec<u8>| KeyError::Length {
            kind,
            expected: N,
            actual: decoded.len(),
        })
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("signs", &self.signs())
            .field("verifies", &self.verifies())
            .finish()
    }
}

impl std::fmt::Debug for GeneratedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKeys").finish_non_exhaustive()
    }
}
