//! Error types for the IPv6 rotator
//!
//! This module defines all error types used throughout the crate.

use std::net::Ipv6Addr;
use thiserror::Error;

/// Result type alias for rotator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the IPv6 rotator
#[derive(Error, Debug)]
pub enum Error {
    /// The process lacks the privilege to change interfaces and routes
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The initial IPv6 connectivity probe failed
    #[error("No IPv6 connectivity: {0}")]
    NoIpv6Connectivity(String),

    /// A service name is not in the known service table
    #[error("{0} isn't a valid service")]
    InvalidServiceName(String),

    /// Range resolution produced an empty set
    #[error("No service or ranges given")]
    NoRangesSelected,

    /// Invalid input (malformed CIDR, wrong address family, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The routing table could not tell us how to reach the service ranges
    #[error("Route lookup failed: {0}")]
    RouteLookupFailed(String),

    /// The requested network interface does not exist
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    /// Adding the random address to the interface failed
    #[error("Failed to add the random IPv6 address: {0}")]
    AddressAssignmentFailed(String),

    /// Adding a route failed
    #[error("Failed to configure IPv6 route: {0}")]
    RouteInstallFailed(String),

    /// The verification request could not be completed
    #[error("Verification request failed: {0}")]
    VerificationRequestFailed(String),

    /// The echo service saw a different source address than the one assigned
    #[error("The new random IPv6 address is not used: expected {expected}, echo service saw {observed}")]
    VerificationMismatch {
        /// Address that was assigned
        expected: Ipv6Addr,
        /// Address reported by the echo service
        observed: String,
    },

    /// Record store errors
    #[error("Record store error: {0}")]
    StoreIo(String),

    /// A state file from the pre-JSON version of the tool is present
    #[error("Legacy state file detected at {0}; clean it with the old version first")]
    LegacyStateDetected(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a permission error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a connectivity error
    pub fn no_connectivity(msg: impl Into<String>) -> Self {
        Self::NoIpv6Connectivity(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a route lookup error
    pub fn route_lookup(msg: impl Into<String>) -> Self {
        Self::RouteLookupFailed(msg.into())
    }

    /// Create an address assignment error
    pub fn address_assignment(msg: impl Into<String>) -> Self {
        Self::AddressAssignmentFailed(msg.into())
    }

    /// Create a route installation error
    pub fn route_install(msg: impl Into<String>) -> Self {
        Self::RouteInstallFailed(msg.into())
    }

    /// Create a verification request error
    pub fn verification_request(msg: impl Into<String>) -> Self {
        Self::VerificationRequestFailed(msg.into())
    }

    /// Create a record store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreIo(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error comes from operator input rather than from the system
    ///
    /// The binary maps these to its usage exit code.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_)
                | Self::InvalidServiceName(_)
                | Self::NoRangesSelected
                | Self::InvalidInput(_)
                | Self::InterfaceNotFound(_)
                | Self::LegacyStateDetected(_)
                | Self::Config(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
