//! IPv4 address predicates used by account block lists.
//!
//! A block-list entry is one of:
//! - `a.b.c.d-e.f.g.h`: inclusive range over the 32-bit address value
//! - `a.b.c.d/len`: CIDR network
//! - `a.b.c.d`: shorthand for the single-address range `a.b.c.d-a.b.c.d`
//!
//! IPv6 entries are rejected. IPv6 client addresses never match, except
//! IPv4-mapped ones (`::ffff:a.b.c.d`), which are checked as their IPv4 form.

use ipnet::Ipv4Net;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpCheckerError {
    #[error("'{0}' is invalid address")]
    InvalidAddress(String),

    #[error("'{0}' is not an IPv4 address, ip range does not support IPv6")]
    NotIpv4(String),

    #[error("'{0}' is invalid ip range")]
    InvalidRange(String),

    #[error("'{0}' is invalid network")]
    InvalidNetwork(String),
}

/// Predicate over IPv4 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpChecker {
    /// Inclusive range; a range with `start > end` contains nothing.
    Range { start: u32, end: u32 },
    Cidr(Ipv4Net),
}

fn parse_v4(s: &str) -> Result<Ipv4Addr, IpCheckerError> {
    let s = s.trim();
    match IpAddr::from_str(s) {
        Ok(IpAddr::V4(v4)) => Ok(v4),
        Ok(IpAddr::V6(_)) => Err(IpCheckerError::NotIpv4(s.to_string())),
        Err(_) => Err(IpCheckerError::InvalidAddress(s.to_string())),
    }
}

/// Reduce a client address to IPv4, unwrapping IPv4-mapped IPv6.
fn as_v4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

impl IpChecker {
    pub fn range(start: Ipv4Addr, end: Ipv4Addr) -> Self {
        IpChecker::Range {
            start: u32::from(start),
            end: u32::from(end),
        }
    }

    /// Build a range from two textual addresses.
    pub fn range_from_str(start: &str, end: &str) -> Result<Self, IpCheckerError> {
        Ok(Self::range(parse_v4(start)?, parse_v4(end)?))
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let Some(v4) = as_v4(ip) else {
            return false;
        };

        match self {
            IpChecker::Range { start, end } => {
                let value = u32::from(v4);
                *start <= value && value <= *end
            }
            IpChecker::Cidr(net) => net.contains(&v4),
        }
    }

    /// Parse `address` and test it; an unparsable address never matches.
    pub fn contains_str(&self, address: &str) -> bool {
        IpAddr::from_str(address.trim()).is_ok_and(|ip| self.contains(ip))
    }
}

impl FromStr for IpChecker {
    type Err = IpCheckerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.contains('-') {
            let mut parts = s.split('-');
            return match (parts.next(), parts.next(), parts.next()) {
                (Some(start), Some(end), None) => {
                    Self::range_from_str(start, end).map_err(|_| IpCheckerError::InvalidRange(s.to_string()))
                }
                _ => Err(IpCheckerError::InvalidRange(s.to_string())),
            };
        }

        if let Some((addr, _)) = s.split_once('/') {
            parse_v4(addr)?;
            return Ipv4Net::from_str(s)
                .map(|net| IpChecker::Cidr(net.trunc()))
                .map_err(|_| IpCheckerError::InvalidNetwork(s.to_string()));
        }

        let addr = parse_v4(s)?;
        Ok(Self::range(addr, addr))
    }
}

impl fmt::Display for IpChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpChecker::Range { start, end } => {
                write!(f, "{}-{}", Ipv4Addr::from(*start), Ipv4Addr::from(*end))
            }
            IpChecker::Cidr(net) => write!(f, "{net}"),
        }
    }
}
