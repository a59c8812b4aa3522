//! Rotation and cleanup procedures
//!
//! The Rotator is responsible for:
//! - Resolving the range set and drawing a random address
//! - Finding the interface and gateway the ranges are reached through
//! - Persisting a rotation record before touching the system
//! - Adding the address, verifying it is used, installing the routes
//! - Undoing all of it, best-effort, on failure or on request
//!
//! ## Rotation Flow
//!
//! ```text
//!  resolve ranges ─► connectivity probe ─► clean stale record
//!        │
//!        ▼
//!  random address ─► route lookup ─► save record ─┐
//!                                                  │  (any failure from here
//!        ┌─────────────────────────────────────────┘   rolls back via clean)
//!        ▼
//!  add address ─► [verification route ─► echo check ─► drop route] ─► add routes
//! ```

use ipnet::Ipv6Net;
use std::net::Ipv6Addr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::allocator;
use crate::config::RotatorConfig;
use crate::error::{Error, Result};
use crate::ranges::{RangeSelection, ServiceRangeSet, parse_ipv6_cidr};
use crate::traits::{AddressVerifier, NetworkOps, RecordStore, RotationRecord, RouteInfo, RouteSpec};

/// Operator-chosen interface and gateway, bypassing the route lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceOverride {
    /// Interface name (e.g. "eth0")
    pub interface: String,
    /// Next hop to use for the routes
    pub gateway: Ipv6Addr,
}

impl InterfaceOverride {
    /// Build an override from the optional CLI values
    ///
    /// Both or neither must be given.
    pub fn from_parts(interface: Option<String>, gateway: Option<String>) -> Result<Option<Self>> {
        match (interface, gateway) {
            (None, None) => Ok(None),
            (Some(interface), Some(gateway)) => {
                let gateway = gateway.trim().parse::<Ipv6Addr>().map_err(|e| {
                    Error::invalid_input(format!("'{}' is not an IPv6 gateway: {}", gateway, e))
                })?;
                Ok(Some(Self { interface, gateway }))
            }
            _ => Err(Error::config(
                "Both --interface and --gateway must be specified together",
            )),
        }
    }
}

/// Everything a rotation needs from the operator
#[derive(Debug, Clone)]
pub struct RotationRequest {
    /// Subnet to draw the address from, as written by the operator
    pub subnet: String,

    /// Which service ranges to rotate for
    pub selection: RangeSelection,

    /// Skip the route lookup and use this interface/gateway
    pub interface_override: Option<InterfaceOverride>,

    /// Skip the echo-service check (unattended runs)
    pub skip_verification: bool,
}

impl RotationRequest {
    /// Create a request for `subnet` and `selection`, with verification on
    pub fn new(subnet: impl Into<String>, selection: RangeSelection) -> Self {
        Self {
            subnet: subnet.into(),
            selection,
            interface_override: None,
            skip_verification: false,
        }
    }

    /// Use a fixed interface and gateway
    pub fn with_interface_override(mut self, interface_override: Option<InterfaceOverride>) -> Self {
        self.interface_override = interface_override;
        self
    }

    /// Enable or disable the echo-service check
    pub fn with_skip_verification(mut self, skip: bool) -> Self {
        self.skip_verification = skip;
        self
    }
}

/// Result of a cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// No record existed for the range set
    NothingToClean,

    /// The record was found, undone and deleted
    Cleaned {
        /// The record that was cleaned
        record: RotationRecord,
        /// Steps that failed (already logged)
        failures: Vec<String>,
    },
}

impl CleanupOutcome {
    /// Whether a record was cleaned
    pub fn was_cleaned(&self) -> bool {
        matches!(self, Self::Cleaned { .. })
    }
}

/// Runs rotations and cleanups against injected collaborators
///
/// ## Lifecycle
///
/// 1. Create with [`Rotator::new()`]
/// 2. Call [`Rotator::rotate()`], [`Rotator::clean()`] or [`Rotator::clean_all()`]
///
/// Every step is awaited in order; nothing runs concurrently.
pub struct Rotator {
    /// Kernel access
    network: Box<dyn NetworkOps>,

    /// Echo service access
    verifier: Box<dyn AddressVerifier>,

    /// Where rotation records live
    store: Box<dyn RecordStore>,

    /// Delays and verification settings
    config: RotatorConfig,
}

impl Rotator {
    /// Create a new rotator
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `config` does not validate.
    pub fn new(
        network: Box<dyn NetworkOps>,
        verifier: Box<dyn AddressVerifier>,
        store: Box<dyn RecordStore>,
        config: RotatorConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            network,
            verifier,
            store,
            config,
        })
    }

    /// Rotate the outbound address for the requested ranges
    ///
    /// On success the returned record is what was persisted. Any failure
    /// after the record was saved is rolled back with [`Rotator::clean()`]
    /// before the original error is returned.
    pub async fn rotate(&self, request: &RotationRequest) -> Result<RotationRecord> {
        let ranges = request.selection.resolve()?;
        let subnet = parse_ipv6_cidr(&request.subnet)?;

        if request.skip_verification {
            info!("Running without checking if the IPv6 address configured will work properly");
        }

        self.verifier.check_connectivity().await?;
        info!("You have IPv6 connectivity, continuing");

        self.clean(&ranges).await?;

        let address = allocator::random_address(&subnet);
        let route = self
            .discover_route(&ranges, request.interface_override.as_ref())
            .await?;

        let record = RotationRecord {
            ranges: ranges.clone(),
            assigned_address: address,
            address_prefix_length: subnet.prefix_len(),
            gateway: route.gateway,
            interface_index: route.interface_index,
            interface_name: route.interface_name,
            source_subnet: request.subnet.clone(),
            created_at: None,
        }
        .stamped();

        // Saved before the first change, so a crash can still be cleaned up
        self.store.save(&record).await?;

        debug!(
            address = %record.assigned_address,
            prefix_len = record.address_prefix_length,
            gateway = %record.gateway,
            interface = %record.interface_name,
            interface_index = record.interface_index,
            subnet = %record.source_subnet,
            ranges = %record.ranges,
            "Rotation record saved"
        );

        if let Err(e) = self.apply(&record, request.skip_verification).await {
            error!("Rotation failed, rolling back: {}", e);
            if let Err(cleanup_err) = self.clean(&ranges).await {
                error!("Rollback could not complete: {}", cleanup_err);
            }
            return Err(e);
        }

        info!(
            "Configured IPv6 routes for {} via {} on {}",
            record.ranges, record.assigned_address, record.interface_name
        );
        Ok(record)
    }

    /// Undo the rotation recorded for `ranges`
    ///
    /// A missing record is not an error. Failed undo steps are logged and
    /// reported in the outcome; only record store errors are returned.
    pub async fn clean(&self, ranges: &ServiceRangeSet) -> Result<CleanupOutcome> {
        match self.store.find(ranges).await? {
            Some(record) => self.clean_record(record).await,
            None => {
                info!("No cleanup of previous setup needed for {}", ranges);
                Ok(CleanupOutcome::NothingToClean)
            }
        }
    }

    /// Undo every stored rotation
    ///
    /// Returns the number of records cleaned.
    pub async fn clean_all(&self) -> Result<usize> {
        let records = self.store.list_all().await?;
        if records.is_empty() {
            info!("No cleanup of previous setup needed");
            return Ok(0);
        }

        let mut cleaned = 0;
        for record in records {
            if self.clean_record(record).await?.was_cleaned() {
                cleaned += 1;
            }
        }
        Ok(cleaned)
    }

    /// Work out which interface and gateway the routes go through
    async fn discover_route(
        &self,
        ranges: &ServiceRangeSet,
        interface_override: Option<&InterfaceOverride>,
    ) -> Result<RouteInfo> {
        if let Some(over) = interface_override {
            let interface_index = self
                .network
                .interface_index(&over.interface)
                .await?
                .ok_or_else(|| Error::InterfaceNotFound(over.interface.clone()))?;

            return Ok(RouteInfo {
                interface_index,
                interface_name: over.interface.clone(),
                gateway: over.gateway,
            });
        }

        let probe: Ipv6Net = ranges
            .choose(&mut rand::rng())
            .ok_or(Error::NoRangesSelected)?;

        let route = self.network.route_to(probe.network()).await?;
        debug!(
            "Route to {} goes via {} on {} (index {})",
            probe, route.gateway, route.interface_name, route.interface_index
        );
        Ok(route)
    }

    /// The mutating part of a rotation
    async fn apply(&self, record: &RotationRecord, skip_verification: bool) -> Result<()> {
        self.network
            .add_address(
                record.interface_index,
                record.assigned_address,
                record.address_prefix_length,
            )
            .await
            .map_err(as_address_error)?;

        self.pause(self.config.delays.after_address()).await;

        if !skip_verification {
            self.verify(record).await?;
        }

        for range in record.ranges.iter() {
            let route = RouteSpec::new(
                *range,
                record.assigned_address,
                record.gateway,
                record.interface_index,
            );
            self.network.add_route(&route).await.map_err(as_route_error)?;
        }

        info!("Successful setup, waiting for the propagation in the kernel");
        self.pause(self.config.delays.after_routes()).await;
        Ok(())
    }

    /// Route the echo service via the new address and check what it sees
    async fn verify(&self, record: &RotationRecord) -> Result<()> {
        let check_route = self.verification_route(record);
        self.network
            .add_route(&check_route)
            .await
            .map_err(as_route_error)?;

        self.pause(self.config.delays.after_verification_route()).await;

        let observed = self.verifier.observed_address().await?;
        if observed.parse::<Ipv6Addr>().ok() != Some(record.assigned_address) {
            return Err(Error::VerificationMismatch {
                expected: record.assigned_address,
                observed,
            });
        }
        info!("Correctly using the new random IPv6 address, continuing");

        if let Err(e) = self.network.remove_route(&check_route).await {
            warn!("Failed to remove the verification route: {}", e);
        }
        Ok(())
    }

    /// Best-effort undo of one record, then delete it
    async fn clean_record(&self, record: RotationRecord) -> Result<CleanupOutcome> {
        let mut failures = Vec::new();

        // Usually already gone: verification removes it on success
        let check_route = self.verification_route(&record);
        if let Err(e) = self.network.remove_route(&check_route).await {
            debug!("Verification route not removed (may not exist): {}", e);
        }

        for range in record.ranges.iter() {
            let route = RouteSpec::new(
                *range,
                record.assigned_address,
                record.gateway,
                record.interface_index,
            );
            if let Err(e) = self.network.remove_route(&route).await {
                warn!(
                    "Failed to remove route {} (expected if setup failed before routes were added): {}",
                    range, e
                );
                failures.push(format!("route {}: {}", range, e));
            }
        }

        if let Err(e) = self
            .network
            .remove_address(
                record.interface_index,
                record.assigned_address,
                record.address_prefix_length,
            )
            .await
        {
            warn!(
                "Failed to remove address {}/{} from {}: {}",
                record.assigned_address, record.address_prefix_length, record.interface_name, e
            );
            failures.push(format!("address {}: {}", record.assigned_address, e));
        }

        self.store.remove(&record.ranges).await?;

        info!(
            "Finished cleaning up {} ({} step(s) failed), waiting for the propagation in the kernel",
            record.ranges,
            failures.len()
        );
        self.pause(self.config.delays.after_cleanup()).await;

        Ok(CleanupOutcome::Cleaned { record, failures })
    }

    fn verification_route(&self, record: &RotationRecord) -> RouteSpec {
        RouteSpec::host(
            self.config.verification.address,
            record.assigned_address,
            record.gateway,
            record.interface_index,
        )
    }

    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            debug!("Waiting {:?}", duration);
            tokio::time::sleep(duration).await;
        }
    }
}

fn as_address_error(e: Error) -> Error {
    match e {
        Error::AddressAssignmentFailed(_)
        | Error::PermissionDenied(_)
        | Error::InvalidInput(_) => e,
        other => Error::address_assignment(other.to_string()),
    }
}

fn as_route_error(e: Error) -> Error {
    match e {
        Error::RouteInstallFailed(_) | Error::PermissionDenied(_) | Error::InvalidInput(_) => e,
        other => Error::route_install(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_needs_both_parts() {
        assert_eq!(InterfaceOverride::from_parts(None, None).unwrap(), None);
        assert!(matches!(
            InterfaceOverride::from_parts(Some("eth0".into()), None),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            InterfaceOverride::from_parts(None, Some("fe80::1".into())),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_override_parses_gateway() {
        let over = InterfaceOverride::from_parts(Some("eth0".into()), Some("fe80::1".into()))
            .unwrap()
            .unwrap();
        assert_eq!(over.gateway, "fe80::1".parse::<Ipv6Addr>().unwrap());

        assert!(matches!(
            InterfaceOverride::from_parts(Some("eth0".into()), Some("192.0.2.1".into())),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_error_mapping_keeps_specific_kinds() {
        let e = as_route_error(Error::route_install("exists"));
        assert!(matches!(e, Error::RouteInstallFailed(msg) if msg == "exists"));

        let e = as_address_error(Error::Other("EEXIST".into()));
        assert!(matches!(e, Error::AddressAssignmentFailed(msg) if msg == "EEXIST"));

        let e = as_address_error(Error::permission_denied("EPERM"));
        assert!(matches!(e, Error::PermissionDenied(_)));
        let e = as_route_error(Error::permission_denied("EACCES"));
        assert!(e.is_usage_error());
    }
}
