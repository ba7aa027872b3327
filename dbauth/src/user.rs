//! Per-lookup user record.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{Error, Result};
use crate::ip::IpChecker;

/// Attribute mapping returned to the caller on successful authentication.
pub type Claims = Map<String, Value>;

/// A user as read from the store for a single authentication attempt.
///
/// Records are built fresh from one row on every lookup and never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    name: String,
    password: String,
    locked_at: Option<DateTime<Utc>>,
    lock_expiry: Duration,
    block_list: Vec<IpChecker>,
    data: Claims,
}

impl UserRecord {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            locked_at: None,
            lock_expiry: Duration::ZERO,
            block_list: Vec::new(),
            data: Claims::new(),
        }
    }

    /// Set the lock timestamp and window; a zero window locks permanently.
    pub fn with_lock(mut self, locked_at: Option<DateTime<Utc>>, lock_expiry: Duration) -> Self {
        self.locked_at = locked_at;
        self.lock_expiry = lock_expiry;
        self
    }

    pub fn with_block_list(mut self, block_list: Vec<IpChecker>) -> Self {
        self.block_list = block_list;
        self
    }

    pub fn with_data(mut self, data: Claims) -> Self {
        self.data = data;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored secret; empty means the account cannot log in.
    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.locked_at
    }

    pub fn lock_expiry(&self) -> Duration {
        self.lock_expiry
    }

    pub fn block_list(&self) -> &[IpChecker] {
        &self.block_list
    }

    pub fn data(&self) -> &Claims {
        &self.data
    }

    pub fn into_data(self) -> Claims {
        self.data
    }

    /// Check whether the account may be used from `address` right now.
    pub fn can_use(&self, address: &str) -> Result<()> {
        self.can_use_at(address, Utc::now())
    }

    /// Check usability at `now`: the IP allow-list first, then the lock.
    ///
    /// An expired lock is reported usable but left in the store untouched.
    pub fn can_use_at(&self, address: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.block_list.is_empty() {
            let ip = IpAddr::from_str(address.trim()).map_err(|_| Error::AddressInvalid {
                address: address.to_string(),
            })?;

            if !self.block_list.iter().any(|checker| checker.contains(ip)) {
                return Err(Error::IpBlocked {
                    address: address.to_string(),
                });
            }
        }

        if let Some(locked_at) = self.locked_at {
            if self.lock_expiry.is_zero() {
                return Err(Error::PermanentlyLocked);
            }
            // an expiry too large for chrono never ends
            let until = chrono::Duration::from_std(self.lock_expiry)
                .ok()
                .and_then(|expiry| locked_at.checked_add_signed(expiry));
            match until {
                Some(until) if now < until => return Err(Error::TemporarilyLocked { until }),
                Some(_) => {}
                None => return Err(Error::PermanentlyLocked),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_unlocked_is_usable_regardless_of_expiry() {
        for expiry in [Duration::ZERO, Duration::from_secs(60), Duration::from_secs(86_400)] {
            let user = UserRecord::new("alice", "pw").with_lock(None, expiry);
            assert!(user.can_use_at("10.0.0.1", at(12, 0)).is_ok());
        }
    }

    #[test]
    fn test_zero_expiry_is_permanent() {
        let user = UserRecord::new("alice", "pw").with_lock(Some(at(0, 0)), Duration::ZERO);
        assert!(matches!(user.can_use_at("10.0.0.1", at(23, 59)), Err(Error::PermanentlyLocked)));
    }

    #[test]
    fn test_lock_boundary() {
        let user = UserRecord::new("carol", "pw").with_lock(Some(at(12, 0)), Duration::from_secs(30 * 60));

        assert!(matches!(
            user.can_use_at("10.0.0.1", at(12, 29)),
            Err(Error::TemporarilyLocked { until }) if until == at(12, 30)
        ));
        // usable exactly at locked_at + expiry
        assert!(user.can_use_at("10.0.0.1", at(12, 30)).is_ok());
        assert!(user.can_use_at("10.0.0.1", at(13, 0)).is_ok());
    }

    #[test]
    fn test_empty_block_list_never_blocks() {
        let user = UserRecord::new("alice", "pw");
        assert!(user.can_use_at("not even an address", at(12, 0)).is_ok());
        assert!(user.can_use_at("2001:db8::1", at(12, 0)).is_ok());
    }

    #[test]
    fn test_block_list_is_an_allow_list() {
        let user = UserRecord::new("alice", "pw").with_block_list(vec![
            "10.0.0.0/8".parse().unwrap(),
            "192.168.1.5".parse().unwrap(),
        ]);
        assert!(user.can_use_at("10.20.30.40", at(12, 0)).is_ok());
        assert!(user.can_use_at("192.168.1.5", at(12, 0)).is_ok());
        assert!(matches!(
            user.can_use_at("192.168.1.6", at(12, 0)),
            Err(Error::IpBlocked { address }) if address == "192.168.1.6"
        ));
        assert!(matches!(user.can_use_at("2001:db8::1", at(12, 0)), Err(Error::IpBlocked { .. })));
        assert!(matches!(
            user.can_use_at("nonsense", at(12, 0)),
            Err(Error::AddressInvalid { address }) if address == "nonsense"
        ));
    }

    #[test]
    fn test_ip_check_precedes_lock_check() {
        let user = UserRecord::new("alice", "pw")
            .with_block_list(vec!["10.0.0.1".parse().unwrap()])
            .with_lock(Some(at(12, 0)), Duration::ZERO);
        assert!(matches!(user.can_use_at("10.0.0.2", at(12, 0)), Err(Error::IpBlocked { .. })));
        assert!(matches!(user.can_use_at("10.0.0.1", at(12, 0)), Err(Error::PermanentlyLocked)));
    }

    #[test]
    fn test_data_is_returned_verbatim() {
        let mut data = Claims::new();
        data.insert("username".into(), Value::from("alice"));
        data.insert("uid".into(), Value::from(7));
        let user = UserRecord::new("alice", "pw").with_data(data.clone());
        assert_eq!(user.data(), &data);
        assert_eq!(user.into_data(), data);
    }
}
