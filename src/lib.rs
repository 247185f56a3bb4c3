//! cloaklink - password-protected shareable links
//!
//! A destination URL is encrypted under a password (PBKDF2-HMAC-SHA256 key,
//! AES-128-CTR) and published as the query string of a public link. Anyone
//! holding the link can try passwords; only the right one recovers the
//! destination.

#![forbid(unsafe_code)]

pub mod attempt;
pub mod codec;
pub mod error;
pub mod kdf;
pub mod link_ops;
pub mod linkcrypt;
pub mod passphrase;
pub mod payload;
pub mod site;
