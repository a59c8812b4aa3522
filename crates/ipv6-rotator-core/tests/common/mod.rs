//! Test doubles and common utilities for rotation contract tests
//!
//! `FakeKernel` keeps the addresses and routes a real kernel would hold, so
//! tests can assert on the end state instead of on call sequences alone.

#![allow(dead_code)]

use ipnet::Ipv6Net;
use ipv6_rotator_core::config::PropagationDelays;
use ipv6_rotator_core::error::{Error, Result};
use ipv6_rotator_core::traits::{AddressVerifier, NetworkOps, RouteInfo, RouteSpec};
use ipv6_rotator_core::{MemoryRecordStore, RotatorConfig, Rotator};
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Interface the fake route lookup reports
pub const IFACE_NAME: &str = "eth0";
pub const IFACE_INDEX: u32 = 2;

pub fn gateway() -> Ipv6Addr {
    "2001:db8::1".parse().unwrap()
}

pub fn verification_address() -> Ipv6Addr {
    ipv6_rotator_core::config::ICANHAZIP_IPV6_ADDRESS
}

/// One network call, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetCall {
    RouteTo(Ipv6Addr),
    InterfaceIndex(String),
    AddAddress(u32, Ipv6Addr, u8),
    RemoveAddress(u32, Ipv6Addr, u8),
    AddRoute(Ipv6Net),
    RemoveRoute(Ipv6Net),
}

#[derive(Debug, Default)]
struct KernelState {
    addresses: BTreeSet<(u32, Ipv6Addr, u8)>,
    routes: Vec<RouteSpec>,
    calls: Vec<NetCall>,
    fail_add_address: bool,
    deny_changes: bool,
    fail_add_route_for: Option<Ipv6Net>,
    fail_remove_address: bool,
    no_route: bool,
}

/// In-memory stand-in for the kernel's address and route tables
#[derive(Debug, Clone)]
pub struct FakeKernel {
    state: Arc<Mutex<KernelState>>,
    interfaces: Arc<HashMap<String, u32>>,
}

impl FakeKernel {
    pub fn new() -> Self {
        let mut interfaces = HashMap::new();
        interfaces.insert(IFACE_NAME.to_string(), IFACE_INDEX);
        interfaces.insert("wg0".to_string(), 7);

        Self {
            state: Arc::new(Mutex::new(KernelState::default())),
            interfaces: Arc::new(interfaces),
        }
    }

    /// Make `add_address` fail
    pub fn fail_add_address(&self) {
        self.state.lock().unwrap().fail_add_address = true;
    }

    /// Make `add_address` and `add_route` fail as an unprivileged caller would
    pub fn deny_changes(&self) {
        self.state.lock().unwrap().deny_changes = true;
    }

    /// Make `add_route` fail for this destination
    pub fn fail_add_route_for(&self, destination: Ipv6Net) {
        self.state.lock().unwrap().fail_add_route_for = Some(destination);
    }

    /// Make `remove_address` fail
    pub fn fail_remove_address(&self) {
        self.state.lock().unwrap().fail_remove_address = true;
    }

    /// Make `route_to` report no route
    pub fn without_default_route(&self) {
        self.state.lock().unwrap().no_route = true;
    }

    /// Addresses currently configured
    pub fn addresses(&self) -> Vec<(u32, Ipv6Addr, u8)> {
        self.state.lock().unwrap().addresses.iter().copied().collect()
    }

    /// Routes currently installed
    pub fn routes(&self) -> Vec<RouteSpec> {
        self.state.lock().unwrap().routes.clone()
    }

    /// Destinations of the installed routes
    pub fn route_destinations(&self) -> BTreeSet<Ipv6Net> {
        self.routes().into_iter().map(|r| r.destination).collect()
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<NetCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// The most recently added address, if any is still configured
    pub fn current_address(&self) -> Option<Ipv6Addr> {
        let state = self.state.lock().unwrap();
        state.calls.iter().rev().find_map(|call| match call {
            NetCall::AddAddress(index, addr, prefix)
                if state.addresses.contains(&(*index, *addr, *prefix)) =>
            {
                Some(*addr)
            }
            _ => None,
        })
    }

    /// Whether nothing the rotator adds is left behind
    pub fn is_pristine(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.addresses.is_empty() && state.routes.is_empty()
    }

    /// Drop a route without recording a call, as an operator would by hand
    pub fn remove_route_out_of_band(&self, route: &RouteSpec) {
        self.state
            .lock()
            .unwrap()
            .routes
            .retain(|r| !same_route(r, route));
    }

    /// Pretend a rotation was applied by someone else (stale state)
    pub fn install(&self, address: (u32, Ipv6Addr, u8), routes: Vec<RouteSpec>) {
        let mut state = self.state.lock().unwrap();
        state.addresses.insert(address);
        state.routes.extend(routes);
    }
}

fn same_route(a: &RouteSpec, b: &RouteSpec) -> bool {
    a.destination == b.destination
        && a.preferred_source == b.preferred_source
        && a.gateway == b.gateway
        && a.interface_index == b.interface_index
}

#[async_trait::async_trait]
impl NetworkOps for FakeKernel {
    async fn route_to(&self, destination: Ipv6Addr) -> Result<RouteInfo> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(NetCall::RouteTo(destination));
        if state.no_route {
            return Err(Error::route_lookup("Network is unreachable"));
        }
        Ok(RouteInfo {
            interface_index: IFACE_INDEX,
            interface_name: IFACE_NAME.to_string(),
            gateway: gateway(),
        })
    }

    async fn interface_index(&self, name: &str) -> Result<Option<u32>> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(NetCall::InterfaceIndex(name.to_string()));
        Ok(self.interfaces.get(name).copied())
    }

    async fn add_address(&self, interface_index: u32, address: Ipv6Addr, prefix_len: u8) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(NetCall::AddAddress(interface_index, address, prefix_len));
        if state.deny_changes {
            return Err(Error::permission_denied("Operation not permitted (os error 1)"));
        }
        if state.fail_add_address {
            return Err(Error::Other("Operation not permitted".to_string()));
        }
        if !state.addresses.insert((interface_index, address, prefix_len)) {
            return Err(Error::address_assignment("File exists"));
        }
        Ok(())
    }

    async fn remove_address(&self, interface_index: u32, address: Ipv6Addr, prefix_len: u8) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(NetCall::RemoveAddress(interface_index, address, prefix_len));
        if state.fail_remove_address {
            return Err(Error::Other("Operation not permitted".to_string()));
        }
        if !state.addresses.remove(&(interface_index, address, prefix_len)) {
            return Err(Error::Other("Cannot assign requested address".to_string()));
        }
        Ok(())
    }

    async fn add_route(&self, route: &RouteSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(NetCall::AddRoute(route.destination));
        if state.deny_changes {
            return Err(Error::permission_denied("Operation not permitted (os error 1)"));
        }
        if state.fail_add_route_for == Some(route.destination) {
            return Err(Error::route_install("Invalid argument"));
        }
        if state.routes.iter().any(|r| same_route(r, route)) {
            return Err(Error::route_install("File exists"));
        }
        state.routes.push(route.clone());
        Ok(())
    }

    async fn remove_route(&self, route: &RouteSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(NetCall::RemoveRoute(route.destination));
        let before = state.routes.len();
        state.routes.retain(|r| !same_route(r, route));
        if state.routes.len() == before {
            return Err(Error::Other("No such process".to_string()));
        }
        Ok(())
    }
}

/// How the fake echo service answers
#[derive(Debug, Clone)]
pub enum EchoMode {
    /// Echo whatever address the fake kernel currently has
    Assigned(FakeKernel),
    /// Always answer with this body
    Fixed(String),
    /// The request itself fails
    RequestFails,
    /// The connectivity probe fails
    Offline,
}

/// Echo-service double
#[derive(Debug, Clone)]
pub struct FakeEcho {
    mode: EchoMode,
    connectivity_calls: Arc<AtomicUsize>,
    observe_calls: Arc<AtomicUsize>,
}

impl FakeEcho {
    pub fn new(mode: EchoMode) -> Self {
        Self {
            mode,
            connectivity_calls: Arc::new(AtomicUsize::new(0)),
            observe_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connectivity_calls(&self) -> usize {
        self.connectivity_calls.load(Ordering::SeqCst)
    }

    pub fn observe_calls(&self) -> usize {
        self.observe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AddressVerifier for FakeEcho {
    async fn check_connectivity(&self) -> Result<()> {
        self.connectivity_calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            EchoMode::Offline => Err(Error::no_connectivity("operation timed out")),
            _ => Ok(()),
        }
    }

    async fn observed_address(&self) -> Result<String> {
        self.observe_calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            EchoMode::Assigned(kernel) => Ok(kernel
                .current_address()
                .map(|addr| addr.to_string())
                .unwrap_or_default()),
            EchoMode::Fixed(body) => Ok(body.trim().to_string()),
            EchoMode::RequestFails => Err(Error::verification_request("HTTP 503 Service Unavailable")),
            EchoMode::Offline => Err(Error::verification_request("connection refused")),
        }
    }
}

/// Config without any propagation pauses
pub fn fast_config() -> RotatorConfig {
    RotatorConfig::default().with_delays(PropagationDelays::none())
}

/// Everything a test needs to drive and inspect a rotator
pub struct Harness {
    pub rotator: Rotator,
    pub kernel: FakeKernel,
    pub echo: FakeEcho,
    pub store: MemoryRecordStore,
}

impl Harness {
    /// Rotator over a fresh kernel whose echo service sees the assigned address
    pub fn new() -> Self {
        let kernel = FakeKernel::new();
        Self::with_echo(kernel.clone(), EchoMode::Assigned(kernel))
    }

    pub fn with_echo(kernel: FakeKernel, mode: EchoMode) -> Self {
        Self::with_store(kernel, mode, MemoryRecordStore::new())
    }

    pub fn with_store(kernel: FakeKernel, mode: EchoMode, store: MemoryRecordStore) -> Self {
        let echo = FakeEcho::new(mode);
        let rotator = Rotator::new(
            Box::new(kernel.clone()),
            Box::new(echo.clone()),
            Box::new(store.clone()),
            fast_config(),
        )
        .expect("valid config");

        Self {
            rotator,
            kernel,
            echo,
            store,
        }
    }
}
