// # rtnetlink Message Builders
//
// Pure functions that turn rotator requests into rtnetlink messages and
// kernel replies back into rotator types. Nothing here touches a socket,
// so all of it is testable without privileges.

use ipv6_rotator_core::traits::{RouteInfo, RouteSpec};
use netlink_packet_route::nlas::address::Nla as AddressNla;
use netlink_packet_route::nlas::route::Nla as RouteNla;
use netlink_packet_route::{
    AddressMessage, RouteMessage, AF_INET6, RTN_UNICAST, RTPROT_STATIC, RT_SCOPE_UNIVERSE,
    RT_TABLE_MAIN,
};
use std::net::Ipv6Addr;

/// `RTM_NEWADDR` / `RTM_DELADDR` body for `address/prefix_len` on an interface
pub fn address_message(interface_index: u32, address: Ipv6Addr, prefix_len: u8) -> AddressMessage {
    let mut message = AddressMessage::default();
    message.header.family = AF_INET6 as u8;
    message.header.prefix_len = prefix_len;
    message.header.scope = RT_SCOPE_UNIVERSE;
    message.header.index = interface_index;

    let octets = address.octets().to_vec();
    message.nlas.push(AddressNla::Local(octets.clone()));
    message.nlas.push(AddressNla::Address(octets));
    message
}

/// `RTM_NEWROUTE` / `RTM_DELROUTE` body for a rotation route
///
/// Equivalent to
/// `ip -6 route add <dst> via <gw> dev <oif> src <src> metric <priority>`.
pub fn route_message(route: &RouteSpec) -> RouteMessage {
    let mut message = RouteMessage::default();
    message.header.address_family = AF_INET6 as u8;
    message.header.destination_prefix_length = route.destination.prefix_len();
    message.header.table = RT_TABLE_MAIN;
    message.header.protocol = RTPROT_STATIC;
    message.header.scope = RT_SCOPE_UNIVERSE;
    message.header.kind = RTN_UNICAST;

    message
        .nlas
        .push(RouteNla::Destination(route.destination.network().octets().to_vec()));
    message
        .nlas
        .push(RouteNla::Gateway(route.gateway.octets().to_vec()));
    message
        .nlas
        .push(RouteNla::PrefSource(route.preferred_source.octets().to_vec()));
    message.nlas.push(RouteNla::Oif(route.interface_index));
    message.nlas.push(RouteNla::Priority(route.priority));
    message
}

/// `RTM_GETROUTE` body asking how a single address is reached
///
/// Equivalent to `ip -6 route get <destination>`.
pub fn route_lookup_message(destination: Ipv6Addr) -> RouteMessage {
    let mut message = RouteMessage::default();
    message.header.address_family = AF_INET6 as u8;
    message.header.destination_prefix_length = 128;
    message
        .nlas
        .push(RouteNla::Destination(destination.octets().to_vec()));
    message
}

/// Output interface and gateway of a route lookup reply
///
/// Either may be missing: an on-link destination has no gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LookupReply {
    pub interface_index: Option<u32>,
    pub gateway: Option<Ipv6Addr>,
}

impl LookupReply {
    /// Extract the interesting attributes from an `RTM_NEWROUTE` reply
    pub fn from_route(message: &RouteMessage) -> Self {
        let mut reply = Self::default();
        for nla in &message.nlas {
            match nla {
                RouteNla::Oif(index) => reply.interface_index = Some(*index),
                RouteNla::Gateway(bytes) => reply.gateway = ipv6_from_bytes(bytes),
                _ => {}
            }
        }
        reply
    }

    /// Complete the reply with the interface name
    ///
    /// Returns a message describing what is missing when the route cannot be
    /// used for rotation.
    pub fn into_route_info(
        self,
        destination: Ipv6Addr,
        interface_name: impl FnOnce(u32) -> Option<String>,
    ) -> Result<RouteInfo, String> {
        let interface_index = self
            .interface_index
            .ok_or_else(|| format!("route to {} has no output interface", destination))?;
        let gateway = self
            .gateway
            .ok_or_else(|| format!("route to {} has no gateway", destination))?;
        let interface_name = interface_name(interface_index)
            .ok_or_else(|| format!("interface index {} has no name", interface_index))?;

        Ok(RouteInfo {
            interface_index,
            interface_name,
            gateway,
        })
    }
}

fn ipv6_from_bytes(bytes: &[u8]) -> Option<Ipv6Addr> {
    let octets: [u8; 16] = bytes.try_into().ok()?;
    Some(Ipv6Addr::from(octets))
}
