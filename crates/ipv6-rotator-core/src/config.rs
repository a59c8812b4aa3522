//! Configuration types for the IPv6 rotator
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the rotation record file
pub const DEFAULT_STATE_PATH: &str = "/tmp/smart-ipv6-rotator.json";

/// State file written by the pre-JSON version of the tool
pub const LEGACY_STATE_PATH: &str = "/tmp/smart-ipv6-rotator.py";

/// icanhazip's IPv6 address, used both for the verification route and request
pub const ICANHAZIP_IPV6_ADDRESS: Ipv6Addr = Ipv6Addr::new(0x2606, 0x4700, 0, 0, 0, 0, 0x6812, 0x7261);

/// Virtual host sent with the verification request
pub const ICANHAZIP_HOST: &str = "ipv6.icanhazip.com";

/// Main rotator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatorConfig {
    /// Path of the rotation record file
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Path of the legacy state file whose presence blocks `run`
    #[serde(default = "default_legacy_state_path")]
    pub legacy_state_path: PathBuf,

    /// Pauses that let the kernel pick up changes
    #[serde(default)]
    pub delays: PropagationDelays,

    /// Echo service settings
    #[serde(default)]
    pub verification: VerificationConfig,
}

impl RotatorConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            state_path: default_state_path(),
            legacy_state_path: default_legacy_state_path(),
            delays: PropagationDelays::default(),
            verification: VerificationConfig::default(),
        }
    }

    /// Use a different record file
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    /// Replace the propagation delays
    pub fn with_delays(mut self, delays: PropagationDelays) -> Self {
        self.delays = delays;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.state_path.as_os_str().is_empty() {
            return Err(crate::Error::config("State path cannot be empty"));
        }

        self.verification.validate()
    }

    /// Refuse to run while a state file of the pre-JSON format exists
    ///
    /// Rotations recorded there can only be undone by the old tool.
    pub fn check_legacy_state(&self) -> Result<(), crate::Error> {
        if self.legacy_state_path.exists() {
            return Err(crate::Error::LegacyStateDetected(
                self.legacy_state_path.display().to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Pauses between steps, in seconds
///
/// Route and address changes are not instantly used for new connections;
/// these waits were found empirically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationDelays {
    /// After adding the address
    #[serde(default = "default_after_address_secs")]
    pub after_address_secs: u64,

    /// After adding the verification route, before the request
    #[serde(default = "default_after_verification_route_secs")]
    pub after_verification_route_secs: u64,

    /// After adding the service routes
    #[serde(default = "default_after_routes_secs")]
    pub after_routes_secs: u64,

    /// After a cleanup
    #[serde(default = "default_after_cleanup_secs")]
    pub after_cleanup_secs: u64,
}

impl PropagationDelays {
    /// No pauses at all (tests, or kernels known to apply changes at once)
    pub fn none() -> Self {
        Self {
            after_address_secs: 0,
            after_verification_route_secs: 0,
            after_routes_secs: 0,
            after_cleanup_secs: 0,
        }
    }

    pub fn after_address(&self) -> Duration {
        Duration::from_secs(self.after_address_secs)
    }

    pub fn after_verification_route(&self) -> Duration {
        Duration::from_secs(self.after_verification_route_secs)
    }

    pub fn after_routes(&self) -> Duration {
        Duration::from_secs(self.after_routes_secs)
    }

    pub fn after_cleanup(&self) -> Duration {
        Duration::from_secs(self.after_cleanup_secs)
    }
}

impl Default for PropagationDelays {
    fn default() -> Self {
        Self {
            after_address_secs: default_after_address_secs(),
            after_verification_route_secs: default_after_verification_route_secs(),
            after_routes_secs: default_after_routes_secs(),
            after_cleanup_secs: default_after_cleanup_secs(),
        }
    }
}

/// Echo service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Address the verification request is sent to (and routed via the new address)
    #[serde(default = "default_verification_address")]
    pub address: Ipv6Addr,

    /// Host header sent with the verification request
    #[serde(default = "default_verification_host")]
    pub host: String,

    /// URL probed once at startup to check IPv6 connectivity
    #[serde(default = "default_connectivity_url")]
    pub connectivity_url: String,

    /// Timeout of the verification request (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout of the connectivity probe (in seconds)
    #[serde(default = "default_connectivity_timeout_secs")]
    pub connectivity_timeout_secs: u64,
}

impl VerificationConfig {
    /// Validate the verification settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.address.is_unspecified() {
            return Err(crate::Error::config("Verification address cannot be ::"));
        }
        if self.host.is_empty() {
            return Err(crate::Error::config("Verification host cannot be empty"));
        }
        if !self.connectivity_url.starts_with("http://")
            && !self.connectivity_url.starts_with("https://")
        {
            return Err(crate::Error::config(format!(
                "Connectivity URL must use HTTP or HTTPS scheme. Got: {}",
                self.connectivity_url
            )));
        }
        if self.request_timeout_secs == 0 || self.connectivity_timeout_secs == 0 {
            return Err(crate::Error::config("Verification timeouts must be > 0"));
        }
        Ok(())
    }

    /// URL of the verification request
    pub fn request_url(&self) -> String {
        format!("http://[{}]", self.address)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_secs(self.connectivity_timeout_secs)
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            address: default_verification_address(),
            host: default_verification_host(),
            connectivity_url: default_connectivity_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connectivity_timeout_secs: default_connectivity_timeout_secs(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_PATH)
}

fn default_legacy_state_path() -> PathBuf {
    PathBuf::from(LEGACY_STATE_PATH)
}

fn default_after_address_secs() -> u64 {
    2
}

fn default_after_verification_route_secs() -> u64 {
    4
}

fn default_after_routes_secs() -> u64 {
    6
}

fn default_after_cleanup_secs() -> u64 {
    6
}

fn default_verification_address() -> Ipv6Addr {
    ICANHAZIP_IPV6_ADDRESS
}

fn default_verification_host() -> String {
    ICANHAZIP_HOST.to_string()
}

fn default_connectivity_url() -> String {
    format!("http://{}", ICANHAZIP_HOST)
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_connectivity_timeout_secs() -> u64 {
    10
}
