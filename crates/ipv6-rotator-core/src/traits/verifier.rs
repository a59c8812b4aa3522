// # Address Verifier Trait
//
// Defines how the rotator checks that the new address is really used.
//
// The verifier talks to an echo service that answers with the source
// address it saw. The rotator compares that answer with the address it
// assigned; the verifier itself makes no decision.
//
// ## Implementations
//
// - icanhazip over HTTP: `ipv6-rotator-http` crate

use async_trait::async_trait;

/// Trait for echo-service verification
#[async_trait]
pub trait AddressVerifier: Send + Sync {
    /// Check that the host has working IPv6 connectivity at all
    ///
    /// # Errors
    ///
    /// [`crate::Error::NoIpv6Connectivity`] if the echo service is unreachable.
    async fn check_connectivity(&self) -> Result<(), crate::Error>;

    /// Ask the echo service which source address it sees
    ///
    /// Returns the response body trimmed of surrounding whitespace.
    ///
    /// # Errors
    ///
    /// [`crate::Error::VerificationRequestFailed`] on transport errors and
    /// non-success HTTP statuses.
    async fn observed_address(&self) -> Result<String, crate::Error>;
}
