// # Netlink Network Operations
//
// Linux implementation of `NetworkOps` over rtnetlink.
//
// ## Operations
//
// | Trait method     | rtnetlink request                 | `ip` equivalent               |
// |------------------|-----------------------------------|-------------------------------|
// | `route_to`       | `RTM_GETROUTE`                    | `ip -6 route get <dst>`       |
// | `add_address`    | `RTM_NEWADDR` (create, exclusive) | `ip -6 addr add`              |
// | `remove_address` | `RTM_DELADDR`                     | `ip -6 addr del`              |
// | `add_route`      | `RTM_NEWROUTE` (create, exclusive)| `ip -6 route add ... metric 1`|
// | `remove_route`   | `RTM_DELROUTE`                    | `ip -6 route del`             |
//
// Interface names and indexes are translated with `if_nametoindex(3)` and
// `if_indextoname(3)`.
//
// ## Errors
//
// `EPERM`/`EACCES` from the kernel map to `Error::PermissionDenied`; every
// other errno is reported with the operation's own error kind.
//
// ## Platform Support
//
// Netlink is Linux-only. On other platforms [`NetlinkNetwork::open`] returns
// a configuration error.

#[cfg(target_os = "linux")]
mod message;
#[cfg(target_os = "linux")]
mod socket;

use ipv6_rotator_core::traits::{NetworkOps, RouteInfo, RouteSpec};
use ipv6_rotator_core::{Error, Result};
use std::net::Ipv6Addr;

#[cfg(target_os = "linux")]
use netlink_packet_route::RtnlMessage;
#[cfg(target_os = "linux")]
use socket::{RequestKind, RouteSocket};
#[cfg(target_os = "linux")]
use tracing::debug;

/// rtnetlink-backed network operations
#[cfg(target_os = "linux")]
pub struct NetlinkNetwork {
    socket: RouteSocket,
}

#[cfg(target_os = "linux")]
impl NetlinkNetwork {
    /// Open a `NETLINK_ROUTE` socket
    pub fn open() -> Result<Self> {
        let socket = RouteSocket::open()
            .map_err(|e| Error::Other(format!("Failed to open netlink socket: {}", e)))?;
        Ok(Self { socket })
    }

    fn request(
        &self,
        message: RtnlMessage,
        kind: RequestKind,
        on_error: fn(String) -> Error,
    ) -> Result<Option<RtnlMessage>> {
        self.socket
            .request(message, kind)
            .map_err(|e| kernel_error(e, on_error))
    }
}

#[cfg(target_os = "linux")]
#[async_trait::async_trait]
impl NetworkOps for NetlinkNetwork {
    async fn route_to(&self, destination: Ipv6Addr) -> Result<RouteInfo> {
        let query = RtnlMessage::GetRoute(message::route_lookup_message(destination));
        let reply = match self.request(query, RequestKind::Query, Error::RouteLookupFailed)? {
            Some(RtnlMessage::NewRoute(route)) => route,
            _ => {
                return Err(Error::route_lookup(format!(
                    "no route to {} in the routing table",
                    destination
                )));
            }
        };

        let info = message::LookupReply::from_route(&reply)
            .into_route_info(destination, interface_name)
            .map_err(Error::RouteLookupFailed)?;

        debug!(
            "Kernel routes {} via {} dev {}",
            destination, info.gateway, info.interface_name
        );
        Ok(info)
    }

    async fn interface_index(&self, name: &str) -> Result<Option<u32>> {
        interface_index(name)
    }

    async fn add_address(&self, interface_index: u32, address: Ipv6Addr, prefix_len: u8) -> Result<()> {
        let request = RtnlMessage::NewAddress(message::address_message(
            interface_index,
            address,
            prefix_len,
        ));
        self.request(request, RequestKind::Create, Error::AddressAssignmentFailed)?;
        Ok(())
    }

    async fn remove_address(&self, interface_index: u32, address: Ipv6Addr, prefix_len: u8) -> Result<()> {
        let request = RtnlMessage::DelAddress(message::address_message(
            interface_index,
            address,
            prefix_len,
        ));
        self.request(request, RequestKind::Delete, Error::Other)?;
        Ok(())
    }

    async fn add_route(&self, route: &RouteSpec) -> Result<()> {
        let request = RtnlMessage::NewRoute(message::route_message(route));
        self.request(request, RequestKind::Create, Error::RouteInstallFailed)?;
        Ok(())
    }

    async fn remove_route(&self, route: &RouteSpec) -> Result<()> {
        let request = RtnlMessage::DelRoute(message::route_message(route));
        self.request(request, RequestKind::Delete, Error::Other)?;
        Ok(())
    }
}

/// Placeholder for platforms without netlink
#[cfg(not(target_os = "linux"))]
pub struct NetlinkNetwork;

#[cfg(not(target_os = "linux"))]
impl NetlinkNetwork {
    pub fn open() -> Result<Self> {
        Err(Error::config(
            "Changing IPv6 addresses and routes is only supported on Linux",
        ))
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait::async_trait]
impl NetworkOps for NetlinkNetwork {
    async fn route_to(&self, _destination: Ipv6Addr) -> Result<RouteInfo> {
        Err(unsupported())
    }

    async fn interface_index(&self, _name: &str) -> Result<Option<u32>> {
        Err(unsupported())
    }

    async fn add_address(&self, _index: u32, _address: Ipv6Addr, _prefix_len: u8) -> Result<()> {
        Err(unsupported())
    }

    async fn remove_address(&self, _index: u32, _address: Ipv6Addr, _prefix_len: u8) -> Result<()> {
        Err(unsupported())
    }

    async fn add_route(&self, _route: &RouteSpec) -> Result<()> {
        Err(unsupported())
    }

    async fn remove_route(&self, _route: &RouteSpec) -> Result<()> {
        Err(unsupported())
    }
}

#[cfg(not(target_os = "linux"))]
fn unsupported() -> Error {
    Error::config("netlink is only available on Linux")
}

/// Map a kernel errno to the rotator's error kinds
#[cfg(target_os = "linux")]
fn kernel_error(e: std::io::Error, on_error: fn(String) -> Error) -> Error {
    match e.raw_os_error() {
        Some(libc::EPERM) | Some(libc::EACCES) => Error::permission_denied(format!(
            "{} (changing addresses and routes requires root or CAP_NET_ADMIN)",
            e
        )),
        _ => on_error(e.to_string()),
    }
}

/// Resolve an interface name with `if_nametoindex(3)`
#[cfg(target_os = "linux")]
fn interface_index(name: &str) -> Result<Option<u32>> {
    let c_name = std::ffi::CString::new(name)
        .map_err(|_| Error::invalid_input(format!("invalid interface name '{}'", name)))?;

    // SAFETY:
    // - c_name is a valid NUL-terminated CString
    // - if_nametoindex only reads the string
    // - Returns 0 when no such interface exists
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };

    Ok((index != 0).then_some(index))
}

/// Resolve an interface index with `if_indextoname(3)`
#[cfg(target_os = "linux")]
fn interface_name(index: u32) -> Option<String> {
    let mut buf = [0u8; libc::IF_NAMESIZE];
    // SAFETY:
    // - buf is IF_NAMESIZE bytes, the most if_indextoname writes
    // - index validity is checked by the kernel
    let result = unsafe { libc::if_indextoname(index, buf.as_mut_ptr() as *mut libc::c_char) };

    if result.is_null() {
        return None;
    }

    // SAFETY:
    // - result is non-null (checked above), pointing to buf
    // - if_indextoname guarantees a NUL-terminated string on success
    let name = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr() as *const libc::c_char) }
        .to_string_lossy()
        .into_owned();

    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn test_permission_errors_are_recognized() {
        let e = kernel_error(
            std::io::Error::from_raw_os_error(libc::EPERM),
            Error::RouteInstallFailed,
        );
        assert!(matches!(e, Error::PermissionDenied(_)));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_other_errors_keep_operation_kind() {
        let e = kernel_error(
            std::io::Error::from_raw_os_error(libc::EEXIST),
            Error::RouteInstallFailed,
        );
        assert!(matches!(e, Error::RouteInstallFailed(_)));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_loopback_resolves() {
        let index = interface_index("lo").unwrap().expect("lo exists");
        assert_eq!(interface_name(index).as_deref(), Some("lo"));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_missing_interface() {
        assert_eq!(interface_index("rotator-nope0").unwrap(), None);
        assert!(matches!(interface_index("bad\0name"), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    #[cfg(not(target_os = "linux"))]
    async fn test_unsupported_platform() {
        assert!(NetlinkNetwork::open().is_err());
        assert!(NetlinkNetwork.interface_index("lo").await.is_err());
    }
}
