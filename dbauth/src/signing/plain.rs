//! Stored secret is the password itself.

use super::{SigningMethod, VerifyError, constant_time_eq};

#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl SigningMethod for Plain {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn verify(&self, plain: &str, expected: &str, _key: Option<&[u8]>) -> Result<(), VerifyError> {
        if constant_time_eq(plain.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(VerifyError::Mismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_verify() {
        assert!(Plain.verify("secret", "secret", None).is_ok());
        assert_eq!(Plain.verify("secret", "Secret", None), Err(VerifyError::Mismatch));
        assert_eq!(Plain.verify("", "secret", None), Err(VerifyError::Mismatch));
    }

    #[test]
    fn test_plain_ignores_key() {
        assert!(Plain.verify("secret", "secret", Some(b"pepper")).is_ok());
    }
}
