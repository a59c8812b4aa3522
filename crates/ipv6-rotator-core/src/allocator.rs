//! Random address allocation inside the operator's subnet

use ipnet::Ipv6Net;
use rand::Rng;
use std::net::Ipv6Addr;

/// Draw a random host address in `subnet` using the thread RNG
///
/// See [`random_address_with`].
pub fn random_address(subnet: &Ipv6Net) -> Ipv6Addr {
    random_address_with(subnet, &mut rand::rng())
}

/// Draw a random host address in `subnet`
///
/// The result is `network + offset` with `offset` uniform in
/// `1 .. 2^(128 - prefix)`, so it is never the network address itself unless
/// the subnet is a /128 and holds nothing else.
pub fn random_address_with<R: Rng + ?Sized>(subnet: &Ipv6Net, rng: &mut R) -> Ipv6Addr {
    let network = subnet.network().to_bits();
    let host_bits = u32::from(subnet.max_prefix_len() - subnet.prefix_len());

    let offset = match host_bits {
        0 => 0,
        128 => rng.random_range(1..=u128::MAX),
        bits => rng.random_range(1..(1u128 << bits)),
    };

    Ipv6Addr::from_bits(network | offset)
}
