//! Password reading functionality

use crate::error::{ErrorCategory, ErrorKind, LinkError, Result};
use std::io::{self, IsTerminal, Read};
use zeroize::Zeroizing;

/// Trait for reading link passwords from various sources
pub trait PassphraseReader {
    /// Read a password as UTF-8 text.
    ///
    /// Returns the password wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>>;
}

/// Returns a fixed password (for testing)
pub struct ConstantPassphraseReader {
    passphrase: Zeroizing<String>,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        Ok(self.passphrase.clone())
    }
}

/// Reads a password from any io::Read source
///
/// One trailing line ending is removed, so `echo secret | cloaklink ...`
/// yields `secret`. Browser password fields cannot contain line breaks.
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            LinkError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading password: {}", e),
                e,
            )
        })?;

        let text = std::str::from_utf8(&data).map_err(|e| {
            LinkError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Utf8Invalid,
                "password is not valid UTF-8",
                e,
            )
        })?;
        let trimmed = text
            .strip_suffix('\n')
            .map(|t| t.strip_suffix('\r').unwrap_or(t))
            .unwrap_or(text);
        Ok(Zeroizing::new(trimmed.to_owned()))
    }
}

/// Reads password from terminal with no echo
pub struct TerminalPassphraseReader {
    prompt: String,
}

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self::with_prompt("Password (cloaklink): ")
    }

    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl Default for TerminalPassphraseReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(LinkError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read password from terminal - stdin is not a terminal",
            ));
        }

        // Read password *without echo*; the prompt goes to the tty
        let passphrase = rpassword::prompt_password(&self.prompt).map_err(|e| {
            LinkError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading password: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(passphrase))
    }
}

/// Read a new password twice and require both entries to match.
pub fn read_confirmed(
    first: &mut dyn PassphraseReader,
    second: &mut dyn PassphraseReader,
) -> Result<Zeroizing<String>> {
    let password = first.read_passphrase()?;
    let again = second.read_passphrase()?;
    if *password != *again {
        return Err(LinkError::with_kind(
            ErrorCategory::User,
            ErrorKind::PassphraseUnavailable,
            "passwords do not match",
        ));
    }
    Ok(password)
}
