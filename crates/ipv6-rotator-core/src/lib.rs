// # ipv6-rotator-core
//
// Core library for the smart IPv6 rotator.
//
// ## Architecture Overview
//
// This library provides everything except the OS and HTTP plumbing:
// - **ServiceRangeSet / RangeSelection**: which external IPv6 ranges to rotate for
// - **allocator**: draws a random host address inside the operator's subnet
// - **NetworkOps**: trait for route lookup and address/route manipulation
// - **AddressVerifier**: trait for asking an echo service which address it sees
// - **RecordStore**: trait for persisting what a rotation changed, so it can be undone
// - **Rotator**: runs the rotation and cleanup procedures over those traits
//
// ## Design Principles
//
// 1. **Injected capabilities**: the rotator never opens sockets itself; the
//    binary hands it a `NetworkOps` and an `AddressVerifier`
// 2. **Persist before mutate**: a record is saved before the first kernel change
// 3. **Best-effort cleanup**: every undo step is attempted even if another fails
// 4. **Library-first**: all of the procedure can be driven without the CLI

pub mod allocator;
pub mod config;
pub mod error;
pub mod privilege;
pub mod ranges;
pub mod rotator;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{PropagationDelays, RotatorConfig, VerificationConfig};
pub use error::{Error, Result};
pub use ranges::{RangeSelection, ServiceRangeSet};
pub use rotator::{CleanupOutcome, InterfaceOverride, RotationRequest, Rotator};
pub use state::{FileRecordStore, MemoryRecordStore};
pub use traits::{AddressVerifier, NetworkOps, RecordStore, RotationRecord, RouteInfo, RouteSpec};
