//! Argon2 PHC strings.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordVerifier},
};

use super::{SigningMethod, VerifyError};

/// Verifies `$argon2id$...` (and `$argon2i$`/`$argon2d$`) PHC strings.
///
/// The secret key, when configured, is mixed in as the Argon2 secret
/// ("pepper"); hashes must have been produced with the same key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Method;

impl SigningMethod for Argon2Method {
    fn name(&self) -> &'static str {
        "argon2"
    }

    fn verify(&self, plain: &str, expected: &str, key: Option<&[u8]>) -> Result<(), VerifyError> {
        let parsed_hash = PasswordHash::new(expected).map_err(|e| VerifyError::Malformed(format!("parse hash: {e}")))?;

        // Verification always uses params from the hash
        let argon2 = match key {
            Some(secret) => Argon2::new_with_secret(secret, Algorithm::Argon2id, Version::V0x13, Params::default())
                .map_err(|e| VerifyError::Malformed(format!("argon2 secret: {e}")))?,
            None => Argon2::default(),
        };

        match argon2.verify_password(plain.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(()),
            Err(password_hash::Error::Password) => Err(VerifyError::Mismatch),
            Err(e) => Err(VerifyError::Malformed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};

    fn test_params() -> Params {
        Params::new(1024, 1, 1, None).unwrap()
    }

    fn hash(input: &str, secret: Option<&[u8]>) -> String {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = match secret {
            Some(s) => Argon2::new_with_secret(s, Algorithm::Argon2id, Version::V0x13, test_params()).unwrap(),
            None => Argon2::new(Algorithm::Argon2id, Version::V0x13, test_params()),
        };
        argon2.hash_password(input.as_bytes(), &salt).unwrap().to_string()
    }

    #[test]
    fn test_argon2_verify() {
        let stored = hash("test_password_123", None);
        assert!(Argon2Method.verify("test_password_123", &stored, None).is_ok());
        assert_eq!(
            Argon2Method.verify("wrong_password", &stored, None),
            Err(VerifyError::Mismatch)
        );
    }

    #[test]
    fn test_argon2_with_pepper() {
        let stored = hash("test_password_123", Some(b"pepper"));
        assert!(Argon2Method.verify("test_password_123", &stored, Some(b"pepper")).is_ok());
        assert_eq!(
            Argon2Method.verify("test_password_123", &stored, None),
            Err(VerifyError::Mismatch)
        );
    }

    #[test]
    fn test_argon2_malformed_hash() {
        assert!(matches!(
            Argon2Method.verify("password", "not-a-phc-string", None),
            Err(VerifyError::Malformed(_))
        ));
    }
}
