// # Network Operations Trait
//
// Defines the interface to the host's networking stack.
//
// ## Implementations
//
// - rtnetlink (Linux): `ipv6-rotator-netlink` crate
// - Test doubles: `tests/common` in this crate
//
// ## Usage
//
// ```rust,ignore
// use ipv6_rotator_core::NetworkOps;
//
// async fn show(ops: &dyn NetworkOps) -> ipv6_rotator_core::Result<()> {
//     let route = ops.route_to("2001:4860:4000::".parse()?).await?;
//     println!("via {} dev {}", route.gateway, route.interface_name);
//     Ok(())
// }
// ```

use async_trait::async_trait;
use ipnet::Ipv6Net;
use std::net::Ipv6Addr;

/// Route priority (metric) used for every route the rotator installs
///
/// Low enough to win over the default route the kernel already has.
pub const ROTATION_ROUTE_PRIORITY: u32 = 1;

/// Outbound path the kernel would pick for a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// Output interface index
    pub interface_index: u32,
    /// Output interface name
    pub interface_name: String,
    /// Next hop
    pub gateway: Ipv6Addr,
}

/// A route the rotator adds or removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    /// Destination block
    pub destination: Ipv6Net,
    /// Preferred source address (the rotated address)
    pub preferred_source: Ipv6Addr,
    /// Next hop
    pub gateway: Ipv6Addr,
    /// Output interface index
    pub interface_index: u32,
    /// Route metric
    pub priority: u32,
}

impl RouteSpec {
    /// Route to `destination` sourced from `preferred_source`, with the rotation priority
    pub fn new(
        destination: Ipv6Net,
        preferred_source: Ipv6Addr,
        gateway: Ipv6Addr,
        interface_index: u32,
    ) -> Self {
        Self {
            destination,
            preferred_source,
            gateway,
            interface_index,
            priority: ROTATION_ROUTE_PRIORITY,
        }
    }

    /// Host route (/128) to a single address
    pub fn host(
        destination: Ipv6Addr,
        preferred_source: Ipv6Addr,
        gateway: Ipv6Addr,
        interface_index: u32,
    ) -> Self {
        Self::new(
            Ipv6Net::from(destination),
            preferred_source,
            gateway,
            interface_index,
        )
    }
}

/// Trait for platform network operations
///
/// One implementation per operating system. The rotator only ever talks to
/// the kernel through this trait, which keeps the rotation and cleanup
/// procedures testable without privileges.
///
/// Implementations must not retry; the rotator decides what a failure means.
#[async_trait]
pub trait NetworkOps: Send + Sync {
    /// Ask the routing table how `destination` would be reached
    ///
    /// # Errors
    ///
    /// [`crate::Error::RouteLookupFailed`] when there is no usable route or
    /// the route has no gateway.
    async fn route_to(&self, destination: Ipv6Addr) -> Result<RouteInfo, crate::Error>;

    /// Resolve an interface name to its index
    ///
    /// Returns `Ok(None)` when no such interface exists.
    async fn interface_index(&self, name: &str) -> Result<Option<u32>, crate::Error>;

    /// Add `address/prefix_len` to the interface
    async fn add_address(
        &self,
        interface_index: u32,
        address: Ipv6Addr,
        prefix_len: u8,
    ) -> Result<(), crate::Error>;

    /// Remove `address/prefix_len` from the interface
    async fn remove_address(
        &self,
        interface_index: u32,
        address: Ipv6Addr,
        prefix_len: u8,
    ) -> Result<(), crate::Error>;

    /// Install a route
    async fn add_route(&self, route: &RouteSpec) -> Result<(), crate::Error>;

    /// Remove a route
    async fn remove_route(&self, route: &RouteSpec) -> Result<(), crate::Error>;
}
