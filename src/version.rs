//! API version values carried in the `version=` media-type parameter.

use crate::Error;
use std::fmt;
use std::str::FromStr;

/// A `major.minor` API version such as `36.0`.
///
/// Suffixes after the minor component (`37.0.0-alpha`) are ignored for
/// ordering purposes.
///
/// # Examples
///
/// ```
/// use vcd_client::ApiVersion;
///
/// let v: ApiVersion = "36.2".parse().unwrap();
/// assert!(v > ApiVersion::new(30, 0));
/// assert_eq!(v.to_string(), "36.2");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    major: u32,
    minor: u32,
}

impl ApiVersion {
    /// The last version that uses the legacy multisite signature.
    pub const LEGACY_MULTISITE_MAX: ApiVersion = ApiVersion::new(30, 0);

    /// Creates a version from its components.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Returns `true` if `self <= other`.
    pub fn is_at_most(&self, other: ApiVersion) -> bool {
        *self <= other
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::ConfigurationError(format!("Invalid API version: {s}"));
        let mut parts = s.trim().split(['.', '-']);
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_order() {
        let old: ApiVersion = "29.0".parse().unwrap();
        let new: ApiVersion = "37.0.0-alpha".parse().unwrap();
        assert!(old.is_at_most(ApiVersion::LEGACY_MULTISITE_MAX));
        assert!(!new.is_at_most(ApiVersion::LEGACY_MULTISITE_MAX));
        assert_eq!(new, ApiVersion::new(37, 0));
    }

    #[test]
    fn test_invalid_version() {
        assert!("x.1".parse::<ApiVersion>().is_err());
        assert!("".parse::<ApiVersion>().is_err());
    }
}
