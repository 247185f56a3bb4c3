//! Public link fields and their URL query encoding
//!
//! A link carries five query parameters. `name` is plain display text;
//! the others are standard base64 of raw bytes:
//!
//! | parameter       | content                          |
//! |-----------------|----------------------------------|
//! | `name`          | display name (not protected)     |
//! | `password_salt` | 16-byte KDF salt                 |
//! | `ciphertext`    | encrypted destination            |
//! | `counter`       | 16-byte counter-mode nonce       |
//! | `digest`        | 32-byte SHA-256 of the plaintext |

use crate::codec::{Base64Mode, base64_encode, decode_with};
use crate::error::{ErrorCategory, ErrorKind, LinkError, Result};
use crate::kdf::SALT_LEN;
use crate::linkcrypt::{DIGEST_LEN, EncryptedMessage, NONCE_LEN};
use url::Url;

pub const PARAM_NAME: &str = "name";
pub const PARAM_SALT: &str = "password_salt";
pub const PARAM_CIPHERTEXT: &str = "ciphertext";
pub const PARAM_COUNTER: &str = "counter";
pub const PARAM_DIGEST: &str = "digest";

/// Everything a published link carries. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPayload {
    pub name: String,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub digest: [u8; DIGEST_LEN],
}

impl LinkPayload {
    pub fn new(name: impl Into<String>, salt: [u8; SALT_LEN], message: EncryptedMessage) -> Self {
        Self {
            name: name.into(),
            salt,
            nonce: message.nonce,
            ciphertext: message.ciphertext,
            digest: message.digest,
        }
    }

    /// Query parameters in publication order.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (PARAM_NAME, self.name.clone()),
            (PARAM_SALT, base64_encode(&self.salt)),
            (PARAM_CIPHERTEXT, base64_encode(&self.ciphertext)),
            (PARAM_COUNTER, base64_encode(&self.nonce)),
            (PARAM_DIGEST, base64_encode(&self.digest)),
        ]
    }

    /// `base` with its fragment and query replaced by this payload.
    pub fn apply_to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.set_fragment(None);
        url.set_query(None);
        url.query_pairs_mut().extend_pairs(self.to_query_pairs());
        url
    }

    /// Rebuild a payload from decoded query parameters.
    ///
    /// Fails with `MissingField` when `name` (or any other field) is absent
    /// and with `MalformedPayload` when a field does not decode to the
    /// expected length. Repeated parameters resolve to their first value.
    pub fn from_query_pairs<I, K, V>(pairs: I, mode: Base64Mode) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut fields = RawFields::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                PARAM_NAME => &mut fields.name,
                PARAM_SALT => &mut fields.salt,
                PARAM_CIPHERTEXT => &mut fields.ciphertext,
                PARAM_COUNTER => &mut fields.counter,
                PARAM_DIGEST => &mut fields.digest,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.as_ref().to_owned());
            }
        }

        let name = fields.name.ok_or_else(|| {
            LinkError::with_kind(
                ErrorCategory::User,
                ErrorKind::MissingField,
                "link has no name parameter; not an encrypted link",
            )
        })?;

        let salt = decode_fixed::<SALT_LEN>(PARAM_SALT, required(PARAM_SALT, fields.salt)?, mode)?;
        let ciphertext = decode_field(
            PARAM_CIPHERTEXT,
            &required(PARAM_CIPHERTEXT, fields.ciphertext)?,
            mode,
        )?;
        let nonce =
            decode_fixed::<NONCE_LEN>(PARAM_COUNTER, required(PARAM_COUNTER, fields.counter)?, mode)?;
        let digest =
            decode_fixed::<DIGEST_LEN>(PARAM_DIGEST, required(PARAM_DIGEST, fields.digest)?, mode)?;

        tracing::debug!(
            name = %name,
            ciphertext_len = ciphertext.len(),
            "parsed link payload"
        );

        Ok(Self {
            name,
            salt,
            nonce,
            ciphertext,
            digest,
        })
    }

    pub fn from_url(url: &Url, mode: Base64Mode) -> Result<Self> {
        Self::from_query_pairs(url.query_pairs(), mode)
    }
}

/// Parse a link given as text.
pub fn parse_link(link: &str, mode: Base64Mode) -> Result<LinkPayload> {
    let url = Url::parse(link).map_err(|e| {
        LinkError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::UrlInvalid,
            format!("invalid link: {}", e),
            e,
        )
    })?;
    LinkPayload::from_url(&url, mode)
}

#[derive(Default)]
struct RawFields {
    name: Option<String>,
    salt: Option<String>,
    ciphertext: Option<String>,
    counter: Option<String>,
    digest: Option<String>,
}

fn required(param: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| {
        LinkError::with_kind(
            ErrorCategory::User,
            ErrorKind::MissingField,
            format!("link is missing the {} parameter", param),
        )
    })
}

fn decode_field(param: &str, text: &str, mode: Base64Mode) -> Result<Vec<u8>> {
    decode_with(text, mode).map_err(|e| {
        LinkError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedPayload,
            format!("{} parameter is not valid base64", param),
            e,
        )
    })
}

fn decode_fixed<const N: usize>(param: &str, text: String, mode: Base64Mode) -> Result<[u8; N]> {
    let bytes = decode_field(param, &text, mode)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        LinkError::with_kind(
            ErrorCategory::User,
            ErrorKind::MalformedPayload,
            format!("{} parameter must be {} bytes, got {}", param, N, len),
        )
    })
}
