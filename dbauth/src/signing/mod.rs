//! Pluggable password verification.
//!
//! A [`SigningMethod`] checks a plaintext credential against the encoded secret
//! read from the user store. Methods are looked up by name in a read-only
//! registry that is built on first use and never mutated afterwards:
//!
//! | name                | stored value                                  |
//! |---------------------|-----------------------------------------------|
//! | `plain`             | the password itself (default)                 |
//! | `sha256`, `sha512`  | hex digest of the password                    |
//! | `hs256`, `hs512`    | hex HMAC of the password, keyed by the secret |
//! | `argon2`, `argon2id`| PHC string, secret key used as pepper         |
//!
//! Lookup is case-insensitive. Unknown names are rejected when the
//! authentication handler is built, never per call.

pub mod argon2;
pub mod digest;
pub mod plain;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::errors::Error;

/// Name of the method used when `passwordHashAlg` is not configured.
pub const DEFAULT_METHOD: &str = "plain";

/// Outcome of a failed verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The plaintext does not match the stored secret
    #[error("signature is invalid")]
    Mismatch,

    /// The stored secret (or the key) cannot be decoded
    #[error("malformed password hash: {0}")]
    Malformed(String),
}

/// A credential verification algorithm.
pub trait SigningMethod: Send + Sync + fmt::Debug {
    /// Canonical registry name.
    fn name(&self) -> &'static str;

    /// Whether `verify` needs a secret key to work at all.
    fn requires_key(&self) -> bool {
        false
    }

    /// Verify `plain` against the encoded `expected` secret.
    ///
    /// `key` is only meaningful to keyed algorithms; others ignore it.
    fn verify(&self, plain: &str, expected: &str, key: Option<&[u8]>) -> Result<(), VerifyError>;
}

type Constructor = fn() -> Arc<dyn SigningMethod>;

static REGISTRY: Lazy<HashMap<&'static str, Constructor>> = Lazy::new(|| {
    let mut methods: HashMap<&'static str, Constructor> = HashMap::new();
    methods.insert("plain", || Arc::new(plain::Plain));
    methods.insert("sha256", || Arc::new(digest::Digest::Sha256));
    methods.insert("sha512", || Arc::new(digest::Digest::Sha512));
    methods.insert("hs256", || Arc::new(digest::Hmac::Sha256));
    methods.insert("hs512", || Arc::new(digest::Hmac::Sha512));
    methods.insert("argon2", || Arc::new(argon2::Argon2Method));
    methods.insert("argon2id", || Arc::new(argon2::Argon2Method));
    methods
});

/// Look up a signing method by name, ignoring ASCII case.
pub fn lookup(name: &str) -> Result<Arc<dyn SigningMethod>, Error> {
    let normalized = name.trim().to_ascii_lowercase();
    REGISTRY
        .get(normalized.as_str())
        .map(|construct| construct())
        .ok_or_else(|| Error::UnknownAlgorithm { name: name.to_string() })
}

/// Resolve the configured method and check it can run with `key`.
///
/// `name` defaults to [`DEFAULT_METHOD`]. A keyed method without a non-empty
/// key is a configuration error.
pub fn resolve(name: Option<&str>, key: Option<&str>) -> Result<Arc<dyn SigningMethod>, Error> {
    let method = lookup(name.unwrap_or(DEFAULT_METHOD))?;
    if method.requires_key() && key.is_none_or(str::is_empty) {
        return Err(Error::config(
            "auth.passwordHashKey",
            format!("{} requires a secret key", method.name()),
        ));
    }
    Ok(method)
}

/// All registered names, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Constant-time byte comparison to prevent timing attacks.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
