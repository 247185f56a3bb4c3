//! Link encryption and decryption operations
//!
//! These are the entry points a front end calls: build a link from form
//! fields and a password, or try a password against a link. Neither
//! depends on how the password was obtained or what happens afterwards.

use crate::codec::Base64Mode;
use crate::error::{ErrorCategory, ErrorKind, LinkError, Result};
use crate::kdf::{KdfParams, derive_key_with, random_salt};
use crate::linkcrypt;
use crate::payload::{LinkPayload, parse_link};
use crate::site::emit_config;
use std::path::Path;
use url::Url;

/// What the publisher fills in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFields {
    /// Display name shown on the unlock page. Not secret.
    pub name: String,
    /// Title for the redirect table entry.
    pub title: String,
    /// The secret destination URL.
    pub destination: String,
    /// Address of the unlock page the link points at.
    pub base_url: String,
}

/// A freshly encrypted link.
#[derive(Debug, Clone)]
pub struct PublishedLink {
    pub payload: LinkPayload,
    pub url: Url,
    /// Redirect table entry for the link.
    pub config: String,
}

/// Encrypt `fields.destination` under `password` and assemble the link.
///
/// A fresh salt and nonce are drawn for every call, so encrypting the same
/// fields twice yields two different links.
pub fn encrypt_link(fields: &LinkFields, password: &str, params: &KdfParams) -> Result<PublishedLink> {
    let base = Url::parse(&fields.base_url).map_err(|e| {
        LinkError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::UrlInvalid,
            format!("invalid base URL {:?}: {}", fields.base_url, e),
            e,
        )
    })?;

    let salt = random_salt();
    let key = derive_key_with(password, &salt, params);
    let message = linkcrypt::encrypt(&key, &fields.destination);
    let payload = LinkPayload::new(fields.name.clone(), salt, message);

    let url = payload.apply_to_url(&base);
    let config = emit_config(&fields.name, &fields.title, url.as_str());

    tracing::debug!(
        name = %fields.name,
        ciphertext_len = payload.ciphertext.len(),
        iterations = params.iterations,
        "encrypted link"
    );

    Ok(PublishedLink {
        payload,
        url,
        config,
    })
}

/// Try `password` against `payload`, returning the destination on success.
///
/// Wrong passwords and tampered payloads both fail with
/// `AuthenticationFailed`; nothing distinguishes the two.
pub fn attempt_decrypt(payload: &LinkPayload, password: &str, params: &KdfParams) -> Result<String> {
    let key = derive_key_with(password, &payload.salt, params);
    linkcrypt::decrypt(&key, &payload.ciphertext, &payload.nonce, &payload.digest)
}

/// Parse `link` and try `password` against it.
pub fn open_link(link: &str, password: &str, params: &KdfParams, mode: Base64Mode) -> Result<String> {
    let payload = parse_link(link, mode)?;
    attempt_decrypt(&payload, password, params)
}

/// Write file with secure permissions (0o600 on Unix)
pub fn write_output(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| {
                LinkError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Io,
                    format!("failed to open {}", path.display()),
                    e,
                )
            })?;

        file.write_all(contents).map_err(|e| {
            LinkError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, contents).map_err(|e| {
            LinkError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }
}
