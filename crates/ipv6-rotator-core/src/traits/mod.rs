//! Core traits for the IPv6 rotator
//!
//! This module defines the abstract interfaces the rotator is driven through.
//!
//! - [`NetworkOps`]: Route lookup and address/route manipulation
//! - [`AddressVerifier`]: Ask an echo service which source address it sees
//! - [`RecordStore`]: Persist rotation records for later cleanup

pub mod network;
pub mod record_store;
pub mod verifier;

pub use network::{NetworkOps, RouteInfo, RouteSpec, ROTATION_ROUTE_PRIORITY};
pub use record_store::{RecordStore, RotationRecord};
pub use verifier::AddressVerifier;
