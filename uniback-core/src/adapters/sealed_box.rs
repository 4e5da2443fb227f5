//! Sealed-box field protector
//!
//! Card fields are sealed to the service public key, similar to libsodium's
//! `crypto_box_seal`:
//!
//! 1. A fresh ephemeral X25519 key pair is generated per call
//! 2. ECDH between the ephemeral secret and the service public key
//! 3. HKDF-SHA256 derives the symmetric key
//! 4. XChaCha20-Poly1305 encrypts the field under a random nonce
//!
//! # Envelope Format
//!
//! ```text
//! version: u8 (1 byte)
//! ephemeral_public: [u8; 32]
//! nonce: [u8; 24]
//! ciphertext: [u8; ...] (includes the 16 byte auth tag)
//! ```
//!
//! Keys live in two armored text files. Only the holder of the private key
//! can reveal fields or compute fingerprints.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tracing::{info, warn};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::domain::result::{Error, Result};
use crate::ports::FieldProtector;

/// Current envelope format version
pub const ENVELOPE_VERSION: u8 = 1;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;
const HEADER_SIZE: usize = 1 + KEY_SIZE + NONCE_SIZE;

const HKDF_LABEL: &[u8] = b"uniback:sealed-field";
const AEAD_LABEL: &[u8] = b"uniback:card-field";
const FINGERPRINT_LABEL: &[u8] = b"uniback:card-fingerprint";

const PUBLIC_ARMOR: &str = "UNIBACK PUBLIC KEY";
const PRIVATE_ARMOR: &str = "UNIBACK PRIVATE KEY";

/// [`FieldProtector`] using X25519 sealed boxes
pub struct SealedBoxProtector {
    public: PublicKey,
    secret: StaticSecret,
    fingerprint_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl std::fmt::Debug for SealedBoxProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedBoxProtector")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SealedBoxProtector {
    /// Build a protector from an existing secret key
    pub fn from_secret(secret_bytes: [u8; KEY_SIZE]) -> Result<Self> {
        let secret = StaticSecret::from(secret_bytes);
        let public = PublicKey::from(&secret);
        let fingerprint_key = derive_fingerprint_key(&secret)?;
        Ok(Self {
            public,
            secret,
            fingerprint_key,
        })
    }

    /// Fresh random key pair, not persisted
    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(bytes.as_mut());
        Self::from_secret(*bytes)
    }

    /// Load the key pair from disk, generating it when needed
    ///
    /// Both files present: load and check that they belong together. Exactly
    /// one present: the survivor is deleted and a new pair is written. Neither
    /// present: a new pair is written. Calling this again is a no-op load.
    pub fn open_or_provision(public_path: &Path, private_path: &Path) -> anyhow::Result<Self> {
        match (public_path.exists(), private_path.exists()) {
            (true, true) => Self::load(public_path, private_path),
            (has_public, has_private) => {
                if has_public {
                    warn!(path = %public_path.display(), "private key missing, regenerating key pair");
                    fs::remove_file(public_path)
                        .with_context(|| format!("Failed to remove {}", public_path.display()))?;
                }
                if has_private {
                    warn!(path = %private_path.display(), "public key missing, regenerating key pair");
                    fs::remove_file(private_path)
                        .with_context(|| format!("Failed to remove {}", private_path.display()))?;
                }
                let protector = Self::generate()?;
                protector.save(public_path, private_path)?;
                info!(path = %public_path.display(), "provisioned new field protection keys");
                Ok(protector)
            }
        }
    }

    fn load(public_path: &Path, private_path: &Path) -> anyhow::Result<Self> {
        let public_text = fs::read_to_string(public_path)
            .with_context(|| format!("Failed to read {}", public_path.display()))?;
        let private_text = Zeroizing::new(
            fs::read_to_string(private_path)
                .with_context(|| format!("Failed to read {}", private_path.display()))?,
        );

        let public_bytes = dearmor(&public_text, PUBLIC_ARMOR)
            .with_context(|| format!("Invalid public key in {}", public_path.display()))?;
        let secret_bytes = dearmor(&private_text, PRIVATE_ARMOR)
            .with_context(|| format!("Invalid private key in {}", private_path.display()))?;

        let protector = Self::from_secret(*secret_bytes)?;
        if protector.public.as_bytes() != &*public_bytes {
            bail!(
                "Public key {} does not match private key {}",
                public_path.display(),
                private_path.display()
            );
        }
        Ok(protector)
    }

    fn save(&self, public_path: &Path, private_path: &Path) -> anyhow::Result<()> {
        for path in [public_path, private_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let secret_bytes = Zeroizing::new(self.secret.to_bytes());
        let private_text = Zeroizing::new(armor(secret_bytes.as_ref(), PRIVATE_ARMOR));
        fs::write(private_path, private_text.as_bytes())
            .with_context(|| format!("Failed to write {}", private_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(private_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::write(public_path, armor(self.public.as_bytes(), PUBLIC_ARMOR))
            .with_context(|| format!("Failed to write {}", public_path.display()))?;
        Ok(())
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        self.public.as_bytes()
    }
}

impl FieldProtector for SealedBoxProtector {
    fn protect(&self, plaintext: &str) -> Result<Vec<u8>> {
        let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral_secret);
        let shared = ephemeral_secret.diffie_hellman(&self.public);
        let key = derive_envelope_key(shared.as_bytes(), ephemeral_public.as_bytes(), self.public.as_bytes())?;

        let mut nonce = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| Error::crypto(format!("random source failed: {}", e)))?;

        let cipher = XChaCha20Poly1305::new_from_slice(key.as_ref())
            .map_err(|_| Error::crypto("invalid envelope key length"))?;
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: AEAD_LABEL,
                },
            )
            .map_err(|_| Error::crypto("field encryption failed"))?;

        let mut envelope = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        envelope.push(ENVELOPE_VERSION);
        envelope.extend_from_slice(ephemeral_public.as_bytes());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    fn reveal(&self, envelope: &[u8]) -> Result<String> {
        if envelope.len() < HEADER_SIZE + TAG_SIZE {
            return Err(Error::crypto("sealed field too short"));
        }
        if envelope[0] != ENVELOPE_VERSION {
            return Err(Error::crypto(format!("unsupported envelope version {}", envelope[0])));
        }

        let mut ephemeral_bytes = [0u8; KEY_SIZE];
        ephemeral_bytes.copy_from_slice(&envelope[1..1 + KEY_SIZE]);
        let nonce = &envelope[1 + KEY_SIZE..HEADER_SIZE];
        let ciphertext = &envelope[HEADER_SIZE..];

        let shared = self.secret.diffie_hellman(&PublicKey::from(ephemeral_bytes));
        let key = derive_envelope_key(shared.as_bytes(), &ephemeral_bytes, self.public.as_bytes())?;
        let cipher = XChaCha20Poly1305::new_from_slice(key.as_ref())
            .map_err(|_| Error::crypto("invalid envelope key length"))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(
                    XNonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: AEAD_LABEL,
                    },
                )
                .map_err(|_| Error::crypto("sealed field could not be opened"))?,
        );

        String::from_utf8(plaintext.to_vec()).map_err(|_| Error::crypto("sealed field is not UTF-8"))
    }

    fn fingerprint(&self, plaintext: &str) -> String {
        let (prk, _) = Hkdf::<Sha256>::extract(Some(self.fingerprint_key.as_ref()), plaintext.as_bytes());
        hex::encode(prk)
    }
}

/// Key = HKDF(shared, info = label || ephemeral_public || recipient_public)
fn derive_envelope_key(
    shared_secret: &[u8; KEY_SIZE],
    ephemeral_public: &[u8; KEY_SIZE],
    recipient_public: &[u8; KEY_SIZE],
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let mut info = Vec::with_capacity(HKDF_LABEL.len() + 2 * KEY_SIZE);
    info.extend_from_slice(HKDF_LABEL);
    info.extend_from_slice(ephemeral_public);
    info.extend_from_slice(recipient_public);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Hkdf::<Sha256>::new(None, shared_secret)
        .expand(&info, key.as_mut())
        .map_err(|_| Error::crypto("HKDF expansion failed"))?;
    Ok(key)
}

fn derive_fingerprint_key(secret: &StaticSecret) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let secret_bytes = Zeroizing::new(secret.to_bytes());
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Hkdf::<Sha256>::new(None, secret_bytes.as_ref())
        .expand(FINGERPRINT_LABEL, key.as_mut())
        .map_err(|_| Error::crypto("fingerprint key derivation failed"))?;
    Ok(key)
}

fn armor(bytes: &[u8], label: &str) -> String {
    format!(
        "-----BEGIN {label}-----\n{}\n-----END {label}-----\n",
        STANDARD.encode(bytes)
    )
}

fn dearmor(text: &str, label: &str) -> anyhow::Result<Zeroizing<[u8; KEY_SIZE]>> {
    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);
    let body = text
        .trim()
        .strip_prefix(begin.as_str())
        .and_then(|rest| rest.strip_suffix(end.as_str()))
        .with_context(|| format!("missing {} armor", label))?;
    let decoded = Zeroizing::new(
        STANDARD
            .decode(body.split_whitespace().collect::<String>())
            .context("key is not valid base64")?,
    );
    if decoded.len() != KEY_SIZE {
        bail!("expected {} key bytes, got {}", KEY_SIZE, decoded.len());
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&decoded);
    Ok(key)
}
