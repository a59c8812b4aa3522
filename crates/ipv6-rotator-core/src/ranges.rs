//! Service range selection
//!
//! Works out which external IPv6 ranges the operator wants traffic to be
//! rotated for: named services from the built-in table, manually supplied
//! CIDR blocks, or both.

use ipnet::Ipv6Net;
use rand::Rng;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};

/// Known services and their IPv6 ranges
///
/// Google: https://md5calc.com/google/ip
pub const KNOWN_SERVICES: &[(&str, &[&str])] = &[(
    "google",
    &[
        "2001:4860:4000::/36",
        "2404:6800:4000::/36",
        "2607:f8b0:4000::/36",
        "2800:3f0:4000::/36",
        "2a00:1450:4000::/36",
        "2c0f:fb50:4000::/36",
    ],
)];

/// Service used when the operator does not pass `--services`
pub const DEFAULT_SERVICE: &str = "google";

/// Look up the ranges of a known service
pub fn known_service(name: &str) -> Option<&'static [&'static str]> {
    KNOWN_SERVICES
        .iter()
        .find(|(service, _)| *service == name)
        .map(|(_, ranges)| *ranges)
}

/// Names of all known services, in table order
pub fn service_names() -> impl Iterator<Item = &'static str> {
    KNOWN_SERVICES.iter().map(|(name, _)| *name)
}

/// A non-empty set of IPv6 CIDR blocks
///
/// Blocks are truncated to their network address and kept ordered, so two
/// sets compare equal exactly when they contain the same blocks. This
/// equality is the lookup key for rotation records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Ipv6Net>", into = "Vec<Ipv6Net>")]
pub struct ServiceRangeSet {
    ranges: BTreeSet<Ipv6Net>,
}

impl ServiceRangeSet {
    /// Build a set from already parsed blocks
    ///
    /// Fails with [`Error::NoRangesSelected`] if the input is empty.
    pub fn new(ranges: impl IntoIterator<Item = Ipv6Net>) -> Result<Self> {
        let ranges: BTreeSet<Ipv6Net> = ranges.into_iter().map(|net| net.trunc()).collect();
        if ranges.is_empty() {
            return Err(Error::NoRangesSelected);
        }
        Ok(Self { ranges })
    }

    /// Build a set from CIDR strings
    pub fn from_cidrs<I, S>(cidrs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ranges = cidrs
            .into_iter()
            .map(|cidr| parse_ipv6_cidr(cidr.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(ranges)
    }

    /// Iterate over the blocks in order
    pub fn iter(&self) -> impl Iterator<Item = &Ipv6Net> {
        self.ranges.iter()
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Always false: a set is never empty
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether the set contains this exact block
    pub fn contains(&self, range: &Ipv6Net) -> bool {
        self.ranges.contains(&range.trunc())
    }

    /// Pick one block at random
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Ipv6Net> {
        self.ranges.iter().choose(rng).copied()
    }
}

impl TryFrom<Vec<Ipv6Net>> for ServiceRangeSet {
    type Error = Error;

    fn try_from(ranges: Vec<Ipv6Net>) -> Result<Self> {
        Self::new(ranges)
    }
}

impl From<ServiceRangeSet> for Vec<Ipv6Net> {
    fn from(set: ServiceRangeSet) -> Self {
        set.ranges.into_iter().collect()
    }
}

impl fmt::Display for ServiceRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for range in &self.ranges {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}", range)?;
            first = false;
        }
        Ok(())
    }
}

/// What the operator asked for on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSelection {
    /// Comma-separated service names (e.g. "google")
    pub services: Option<String>,

    /// Comma-separated IPv6 CIDR blocks
    pub manual_ranges: Option<String>,

    /// Ignore `services` entirely
    pub no_services: bool,
}

impl RangeSelection {
    /// Select named services
    pub fn services(services: impl Into<String>) -> Self {
        Self {
            services: Some(services.into()),
            ..Self::default()
        }
    }

    /// Add manually supplied ranges
    pub fn with_manual_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.manual_ranges = Some(ranges.into());
        self
    }

    /// Disable the named-service lookup
    pub fn with_no_services(mut self, no_services: bool) -> Self {
        self.no_services = no_services;
        self
    }

    /// Resolve the selection into the deduplicated union of blocks
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidServiceName`] for a name missing from [`KNOWN_SERVICES`]
    /// - [`Error::InvalidInput`] for a manual range that is not IPv6 CIDR
    /// - [`Error::NoRangesSelected`] if nothing was selected
    pub fn resolve(&self) -> Result<ServiceRangeSet> {
        let mut ranges = Vec::new();

        if let Some(services) = self.services.as_deref().filter(|_| !self.no_services) {
            for name in split_list(services) {
                let known = known_service(name)
                    .ok_or_else(|| Error::InvalidServiceName(name.to_string()))?;
                for cidr in known {
                    ranges.push(parse_ipv6_cidr(cidr)?);
                }
            }
        }

        if let Some(manual) = self.manual_ranges.as_deref() {
            for cidr in split_list(manual) {
                ranges.push(parse_ipv6_cidr(cidr)?);
            }
        }

        ServiceRangeSet::new(ranges)
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Parse an IPv6 CIDR block
///
/// A bare address is rejected; the prefix length must be explicit.
pub fn parse_ipv6_cidr(cidr: &str) -> Result<Ipv6Net> {
    cidr.trim()
        .parse::<Ipv6Net>()
        .map_err(|e| Error::invalid_input(format!("'{}' is not an IPv6 CIDR block: {}", cidr, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_resolves_to_six_ranges() {
        let set = RangeSelection::services("google").resolve().unwrap();
        assert_eq!(set.len(), 6);
        assert!(set.contains(&"2a00:1450:4000::/36".parse().unwrap()));
    }

    #[test]
    fn test_duplicate_services_are_deduplicated() {
        let once = RangeSelection::services("google").resolve().unwrap();
        let twice = RangeSelection::services("google,google").resolve().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_service_is_rejected() {
        let err = RangeSelection::services("google,myspace").resolve().unwrap_err();
        match err {
            Error::InvalidServiceName(name) => assert_eq!(name, "myspace"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_selection_fails() {
        let err = RangeSelection::default().resolve().unwrap_err();
        assert!(matches!(err, Error::NoRangesSelected));
    }

    #[test]
    fn test_no_services_without_manual_ranges_fails() {
        let err = RangeSelection::services("google")
            .with_no_services(true)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::NoRangesSelected));
    }

    #[test]
    fn test_no_services_keeps_manual_ranges_only() {
        let set = RangeSelection::services("google")
            .with_manual_ranges("2001:db8:1::/48, 2001:db8:2::/48")
            .with_no_services(true)
            .resolve()
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "2001:db8:1::/48,2001:db8:2::/48");
    }

    #[test]
    fn test_manual_ranges_merge_with_services() {
        let set = RangeSelection::services("google")
            .with_manual_ranges("2001:4860:4000::/36,2001:db8::/32")
            .resolve()
            .unwrap();
        assert_eq!(set.len(), 7);
    }

    #[test]
    fn test_invalid_manual_range_is_rejected() {
        for bad in ["10.0.0.0/8", "2001:db8::", "not-a-range"] {
            let err = RangeSelection::default()
                .with_manual_ranges(bad)
                .resolve()
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{bad}: {err:?}");
        }
    }

    #[test]
    fn test_set_equality_ignores_order_and_host_bits() {
        let a = ServiceRangeSet::from_cidrs(["2001:db8:1::/48", "2001:db8:2::/48"]).unwrap();
        let b = ServiceRangeSet::from_cidrs(["2001:db8:2::5/48", "2001:db8:1::/48"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_serializes_as_string_array() {
        let set = ServiceRangeSet::from_cidrs(["2001:db8::/32"]).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["2001:db8::/32"]"#);

        let back: ServiceRangeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert!(serde_json::from_str::<ServiceRangeSet>("[]").is_err());
    }
}
