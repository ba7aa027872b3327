//! Hex-encoded SHA-2 digests, plain and keyed.

use hmac::Mac;
use sha2::{Digest as _, Sha256, Sha512};

use super::{SigningMethod, VerifyError, constant_time_eq};

/// Unkeyed digest: the stored value is `hex(sha(password))`.
#[derive(Debug, Clone, Copy)]
pub enum Digest {
    Sha256,
    Sha512,
}

/// Keyed digest: the stored value is `hex(hmac(key, password))`.
#[derive(Debug, Clone, Copy)]
pub enum Hmac {
    Sha256,
    Sha512,
}

fn decode_expected(expected: &str, len: usize) -> Result<Vec<u8>, VerifyError> {
    let bytes = hex::decode(expected.trim()).map_err(|e| VerifyError::Malformed(format!("not hex: {e}")))?;
    if bytes.len() != len {
        return Err(VerifyError::Malformed(format!(
            "expected {len} byte digest, got {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn compare(actual: &[u8], expected: &[u8]) -> Result<(), VerifyError> {
    if constant_time_eq(actual, expected) {
        Ok(())
    } else {
        Err(VerifyError::Mismatch)
    }
}

impl SigningMethod for Digest {
    fn name(&self) -> &'static str {
        match self {
            Digest::Sha256 => "sha256",
            Digest::Sha512 => "sha512",
        }
    }

    fn verify(&self, plain: &str, expected: &str, _key: Option<&[u8]>) -> Result<(), VerifyError> {
        match self {
            Digest::Sha256 => {
                let expected = decode_expected(expected, 32)?;
                compare(&Sha256::digest(plain.as_bytes()), &expected)
            }
            Digest::Sha512 => {
                let expected = decode_expected(expected, 64)?;
                compare(&Sha512::digest(plain.as_bytes()), &expected)
            }
        }
    }
}

impl SigningMethod for Hmac {
    fn name(&self) -> &'static str {
        match self {
            Hmac::Sha256 => "hs256",
            Hmac::Sha512 => "hs512",
        }
    }

    fn requires_key(&self) -> bool {
        true
    }

    fn verify(&self, plain: &str, expected: &str, key: Option<&[u8]>) -> Result<(), VerifyError> {
        let key = key.ok_or_else(|| VerifyError::Malformed(format!("{} requires a secret key", self.name())))?;
        match self {
            Hmac::Sha256 => {
                let expected = decode_expected(expected, 32)?;
                let mut mac = hmac::Hmac::<Sha256>::new_from_slice(key).map_err(|e| VerifyError::Malformed(e.to_string()))?;
                mac.update(plain.as_bytes());
                mac.verify_slice(&expected).map_err(|_| VerifyError::Mismatch)
            }
            Hmac::Sha512 => {
                let expected = decode_expected(expected, 64)?;
                let mut mac = hmac::Hmac::<Sha512>::new_from_slice(key).map_err(|e| VerifyError::Malformed(e.to_string()))?;
                mac.update(plain.as_bytes());
                mac.verify_slice(&expected).map_err(|_| VerifyError::Mismatch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hs256(key: &[u8], input: &str) -> String {
        let mut mac = hmac::Hmac::<Sha256>::new_from_slice(key).unwrap();
        mac.update(input.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_sha256_known_vector() {
        // sha256("password")
        let stored = "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8";
        assert!(Digest::Sha256.verify("password", stored, None).is_ok());
        assert!(Digest::Sha256.verify("password", &stored.to_uppercase(), None).is_ok());
        assert_eq!(Digest::Sha256.verify("Password", stored, None), Err(VerifyError::Mismatch));
    }

    #[test]
    fn test_sha512_roundtrip() {
        let stored = hex::encode(Sha512::digest(b"hunter2"));
        assert!(Digest::Sha512.verify("hunter2", &stored, None).is_ok());
        assert_eq!(Digest::Sha512.verify("hunter3", &stored, None), Err(VerifyError::Mismatch));
    }

    #[test]
    fn test_digest_malformed() {
        assert!(matches!(
            Digest::Sha256.verify("password", "zz-not-hex", None),
            Err(VerifyError::Malformed(_))
        ));
        // valid hex, wrong length
        assert!(matches!(
            Digest::Sha512.verify("password", "abcd", None),
            Err(VerifyError::Malformed(_))
        ));
    }

    #[test]
    fn test_hmac_uses_key() {
        let stored = hs256(b"pepper", "password");
        assert!(Hmac::Sha256.verify("password", &stored, Some(b"pepper")).is_ok());
        assert_eq!(
            Hmac::Sha256.verify("password", &stored, Some(b"other")),
            Err(VerifyError::Mismatch)
        );
    }

    #[test]
    fn test_hmac_without_key_is_malformed() {
        let stored = hs256(b"pepper", "password");
        assert!(matches!(
            Hmac::Sha256.verify("password", &stored, None),
            Err(VerifyError::Malformed(_))
        ));
    }

    #[test]
    fn test_hs512() {
        let mut mac = hmac::Hmac::<Sha512>::new_from_slice(b"k").unwrap();
        mac.update(b"pw");
        let stored = hex::encode(mac.finalize().into_bytes());
        assert!(Hmac::Sha512.verify("pw", &stored, Some(b"k")).is_ok());
        assert_eq!(Hmac::Sha512.verify("pw2", &stored, Some(b"k")), Err(VerifyError::Mismatch));
    }
}
