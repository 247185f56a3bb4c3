//! Password-based key derivation: PBKDF2-HMAC-SHA256 → 128-bit AES key

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroize;

/// Length of the public KDF salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of derived key in bytes (AES-128)
pub const KEY_LEN: usize = 16;

/// PBKDF2 iteration count used by every published link.
///
/// Deliberately modest: the key is re-derived on every keystroke of the
/// unlock form. The count is not carried in the link.
pub const PBKDF2_ITERATIONS: u32 = 1024;

/// Tunable derivation cost. Both ends of a link must use the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

/// A 128-bit key derived from a password and salt.
///
/// Zeroized on drop. Never serialized or transmitted; both sides
/// recompute it.
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the link key with the default cost of 1024 iterations.
pub fn derive_key(password: &str, salt: &[u8; SALT_LEN]) -> DerivedKey {
    derive_key_with(password, salt, &KdfParams::default())
}

/// Derive the link key with an explicit iteration count.
pub fn derive_key_with(password: &str, salt: &[u8; SALT_LEN], params: &KdfParams) -> DerivedKey {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, params.iterations, &mut key);
    let derived = DerivedKey::from_bytes(key);
    key.zeroize();
    derived
}

/// Fresh salt from the operating system CSPRNG.
pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
