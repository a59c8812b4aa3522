// # Record Store Trait
//
// Defines the interface for persisting rotation records.
//
// ## Purpose
//
// A rotation record is everything cleanup needs to undo one rotation: the
// address that was added, where, and which routes point at it. Records are
// written before the first kernel change, so a crash mid-setup still leaves
// enough state behind to clean up.
//
// ## Keying
//
// Records are keyed by their range set. Two records describe "the same
// configuration" iff their range sets are equal as sets, and a store holds
// at most one record per key.
//
// ## Implementations
//
// - File-based: JSON array, atomic replace-on-write
// - Memory: tests and embedding

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;

use crate::ranges::ServiceRangeSet;

/// Persisted state of one completed (or in-progress) rotation
///
/// Serialized field names match the state file of earlier releases, so
/// records they left behind can still be cleaned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRecord {
    /// Ranges routed through the rotated address (the lookup key)
    pub ranges: ServiceRangeSet,

    /// Address added to the interface
    #[serde(rename = "random_ipv6_address")]
    pub assigned_address: Ipv6Addr,

    /// Prefix length the address was added with
    #[serde(rename = "random_ipv6_address_mask")]
    pub address_prefix_length: u8,

    /// Next hop of the installed routes
    pub gateway: Ipv6Addr,

    /// Interface index the address and routes were attached to
    pub interface_index: u32,

    /// Interface name the address and routes were attached to
    pub interface_name: String,

    /// Subnet the address was drawn from, as the operator wrote it
    #[serde(rename = "ipv6_subnet")]
    pub source_subnet: String,

    /// When the record was created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RotationRecord {
    /// Stamp the record with the current time
    pub fn stamped(mut self) -> Self {
        self.created_at = Some(chrono::Utc::now());
        self
    }
}

/// Trait for record store implementations
///
/// # Concurrency
///
/// The rotator is meant to run as a single foreground process. Stores give
/// "last write wins" semantics between processes and nothing stronger.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Find the record whose range set equals `ranges`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: A record exists for this range set
    /// - `Ok(None)`: No record found
    /// - `Err(Error)`: Storage error
    async fn find(&self, ranges: &ServiceRangeSet) -> Result<Option<RotationRecord>, crate::Error>;

    /// Save a record, replacing any record with the same range set
    async fn save(&self, record: &RotationRecord) -> Result<(), crate::Error>;

    /// Remove the record for `ranges`
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: A record was removed
    /// - `Ok(false)`: There was nothing to remove
    /// - `Err(Error)`: Storage error
    async fn remove(&self, ranges: &ServiceRangeSet) -> Result<bool, crate::Error>;

    /// List every stored record
    async fn list_all(&self) -> Result<Vec<RotationRecord>, crate::Error>;
}
