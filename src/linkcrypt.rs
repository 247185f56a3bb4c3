//! Encryption/decryption of link destinations using AES-128-CTR + SHA-256
//!
//! The destination text is encrypted with AES-128 in counter mode. The
//! 16-byte random nonce is the initial counter block; its low 64 bits are
//! incremented big-endian per block and wrap without carrying into the high
//! half (the WebCrypto `length: 64` convention).
//!
//! A SHA-256 digest of the *plaintext* travels next to the ciphertext. On
//! decrypt the digest of the recovered bytes must match, which is how a
//! wrong password is told apart from success. This is a plain hash, not a
//! MAC.

use crate::codec::{utf8_decode, utf8_encode};
use crate::error::{ErrorCategory, ErrorKind, LinkError, Result};
use crate::kdf::DerivedKey;
use aes::Aes128;
use ctr::Ctr64BE;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Length of the counter-mode nonce in bytes
pub const NONCE_LEN: usize = 16;

/// Length of the plaintext digest in bytes
pub const DIGEST_LEN: usize = 32;

type Aes128Ctr64 = Ctr64BE<Aes128>;

/// Output of [`encrypt`]: everything besides the salt that a link carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub digest: [u8; DIGEST_LEN],
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &DerivedKey, plaintext: &str) -> EncryptedMessage {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    encrypt_with_nonce(key, plaintext, &nonce)
}

/// Encrypt `plaintext` under `key` with a caller-provided nonce.
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - reusing a nonce under the same key exposes
/// the XOR of the two plaintexts. Always use `encrypt()`.
pub fn encrypt_with_nonce(
    key: &DerivedKey,
    plaintext: &str,
    nonce: &[u8; NONCE_LEN],
) -> EncryptedMessage {
    let mut buf = utf8_encode(plaintext);
    let digest = sha256(&buf);

    apply_keystream(key, nonce, &mut buf);

    EncryptedMessage {
        nonce: *nonce,
        ciphertext: buf,
        digest,
    }
}

/// Decrypt `ciphertext` and check it against `expected_digest`.
///
/// A wrong key produces garbage that is decoded (lossily) without error;
/// only the digest comparison decides. The comparison is not constant
/// time.
pub fn decrypt(
    key: &DerivedKey,
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
    expected_digest: &[u8; DIGEST_LEN],
) -> Result<String> {
    let mut buf = ciphertext.to_vec();
    apply_keystream(key, nonce, &mut buf);

    let decoded = utf8_decode(&buf);
    let check = sha256(&buf);

    if check == *expected_digest {
        Ok(decoded)
    } else {
        Err(LinkError::with_kind(
            ErrorCategory::User,
            ErrorKind::AuthenticationFailed,
            "corrupt link, tampered-with data, or bad password",
        ))
    }
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(data).into()
}

fn apply_keystream(key: &DerivedKey, nonce: &[u8; NONCE_LEN], buf: &mut [u8]) {
    let mut cipher = Aes128Ctr64::new(key.as_bytes().into(), nonce.into());
    cipher.apply_keystream(buf);
}
