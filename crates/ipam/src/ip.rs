//! Family-tagged address value type.
//!
//! Both families are carried as a 128-bit integer plus an explicit
//! family tag, so range arithmetic is uniform across IPv4 and IPv6.
//! Every comparison and arithmetic operation is family checked; the
//! "does this string look like v6" guessing of classic CNI code is
//! confined to the parsing boundary.

use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{IpamError, Result};

/// Address family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// IPv4
    V4,
    /// IPv6
    V6,
}

impl Family {
    /// Address width in bits.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }

    /// Largest representable address value in this family.
    #[must_use]
    pub fn max_value(self) -> u128 {
        match self {
            Family::V4 => u128::from(u32::MAX),
            Family::V6 => u128::MAX,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// A single address: an immutable family tag plus integer value.
///
/// Ordering is total within a family; across families [`Ip::compare`]
/// fails and [`PartialOrd`] yields `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ip {
    family: Family,
    value: u128,
}

impl Ip {
    /// The family this address belongs to.
    #[must_use]
    pub fn family(&self) -> Family {
        self.family
    }

    pub(crate) fn value(&self) -> u128 {
        self.value
    }

    pub(crate) fn from_value(family: Family, value: u128) -> Ip {
        Ip {
            family,
            value: value.min(family.max_value()),
        }
    }

    /// Family-checked comparison.
    ///
    /// # Errors
    /// [`IpamError::FamilyMismatch`] when the families differ.
    pub fn compare(&self, other: &Ip) -> Result<Ordering> {
        if self.family != other.family {
            return Err(IpamError::FamilyMismatch {
                left: self.family,
                right: other.family,
            });
        }
        Ok(self.value.cmp(&other.value))
    }

    /// The address `n` positions above this one, saturating at the
    /// family's upper bound.
    #[must_use]
    pub fn add(self, n: u128) -> Ip {
        Ip::from_value(self.family, self.value.saturating_add(n))
    }

    /// The address `n` positions below this one, saturating at zero.
    #[must_use]
    pub fn sub(self, n: u128) -> Ip {
        Ip {
            family: self.family,
            value: self.value.saturating_sub(n),
        }
    }
}

impl PartialOrd for Ip {
    fn partial_cmp(&self, other: &Ip) -> Option<Ordering> {
        (self.family == other.family).then(|| self.value.cmp(&other.value))
    }
}

impl From<Ipv4Addr> for Ip {
    fn from(addr: Ipv4Addr) -> Ip {
        Ip {
            family: Family::V4,
            value: u128::from(u32::from(addr)),
        }
    }
}

impl From<Ipv6Addr> for Ip {
    fn from(addr: Ipv6Addr) -> Ip {
        Ip {
            family: Family::V6,
            value: u128::from(addr),
        }
    }
}

impl From<IpAddr> for Ip {
    fn from(addr: IpAddr) -> Ip {
        match addr {
            IpAddr::V4(v4) => Ip::from(v4),
            IpAddr::V6(v6) => Ip::from(v6),
        }
    }
}

impl FromStr for Ip {
    type Err = IpamError;

    fn from_str(s: &str) -> Result<Ip> {
        IpAddr::from_str(s)
            .map(Ip::from)
            .map_err(|_| IpamError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Ip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            Family::V4 => Ipv4Addr::from((self.value & u128::from(u32::MAX)) as u32).fmt(f),
            Family::V6 => Ipv6Addr::from(self.value).fmt(f),
        }
    }
}
