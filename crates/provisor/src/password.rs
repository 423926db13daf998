//! `userPassword` values: SHA-512 crypt hashing and the `{crypt}` scheme tag.

use rand::rngs::OsRng;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha_crypt::{sha512_check, sha512_crypt_b64, Sha512Params};

use provisor_core::{Error, Result};

/// Scheme tag prefixed to every stored credential.
pub const CRYPT_SCHEME_TAG: &str = "{crypt}";

/// Hash value that can never match a password, disabling password login.
pub const DISABLED_LOGIN: &str = "!";

const SALT_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789./";
const SALT_LEN: usize = 8;

/// Credential to store for an account.
#[derive(Debug)]
pub enum Credential {
    /// Plaintext password, hashed with a fresh random salt before it is stored.
    Plaintext(SecretString),
    /// Already hashed crypt(3) string, stored as given.
    Hashed(String),
    /// No usable password.
    Disabled,
}

impl Credential {
    /// Plaintext password credential.
    #[must_use]
    pub fn plaintext(password: impl Into<String>) -> Self {
        Self::Plaintext(SecretString::from(password.into()))
    }

    /// Pre-hashed credential.
    #[must_use]
    pub fn hashed(hash: impl Into<String>) -> Self {
        Self::Hashed(hash.into())
    }

    /// Renders the `userPassword` attribute value for this credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordHash`] if hashing the plaintext fails.
    pub fn to_user_password(&self) -> Result<String> {
        let hash = match self {
            Self::Plaintext(secret) => hash_password(secret)?,
            Self::Hashed(hash) => hash.clone(),
            Self::Disabled => DISABLED_LOGIN.to_string(),
        };
        Ok(format!("{CRYPT_SCHEME_TAG}{hash}"))
    }
}

/// Draws an 8 character salt uniformly from `[A-Za-z0-9./]` using the OS random source.
#[must_use]
pub fn generate_salt() -> String {
    let mut rng = OsRng;
    (0..SALT_LEN)
        .map(|_| char::from(SALT_ALPHABET[rng.gen_range(0..SALT_ALPHABET.len())]))
        .collect()
}

/// Hashes `password` into a `$6$<salt>$<hash>` crypt string with a fresh salt.
///
/// # Errors
///
/// Returns [`Error::PasswordHash`] if the underlying crypt implementation fails.
pub fn hash_password(password: &SecretString) -> Result<String> {
    hash_password_with_salt(password.expose_secret(), &generate_salt())
}

/// Hashes `password` with an explicit salt using the default 5000 rounds.
///
/// # Errors
///
/// Returns [`Error::PasswordHash`] if the underlying crypt implementation fails.
pub fn hash_password_with_salt(password: &str, salt: &str) -> Result<String> {
    let params = Sha512Params::default();
    let hash = sha512_crypt_b64(password.as_bytes(), salt.as_bytes(), &params)
        .map_err(|err| Error::PasswordHash(format!("{err:?}")))?;
    Ok(format!("$6${salt}${hash}"))
}

/// Checks `password` against a stored `userPassword` value (tagged or bare crypt string).
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let hash = strip_scheme_tag(stored);
    hash != DISABLED_LOGIN && sha512_check(password, hash).is_ok()
}

/// Returns the hash with any leading `{crypt}` tag (case-insensitive) removed.
#[must_use]
pub fn strip_scheme_tag(stored: &str) -> &str {
    match stored.get(..CRYPT_SCHEME_TAG.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(CRYPT_SCHEME_TAG) => {
            &stored[CRYPT_SCHEME_TAG.len()..]
        }
        _ => stored,
    }
}
