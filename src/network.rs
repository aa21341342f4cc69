//! Network-identity provider interface.
//!
//! The store never talks to a network itself; it asks this provider which
//! network new records belong to. A provider that is still resolving reports
//! `Loading`, during which record creation fails fast and the
//! current-network views are empty.

use crate::transaction::NetworkId;

/// What the provider currently reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkState {
    Online(NetworkId),
    Loading,
}

impl NetworkState {
    pub fn online(id: impl Into<NetworkId>) -> Self {
        NetworkState::Online(id.into())
    }

    pub fn network_id(&self) -> Option<&str> {
        match self {
            NetworkState::Online(id) => Some(id),
            NetworkState::Loading => None,
        }
    }
}

/// Source of the current network identity
pub trait NetworkProvider: Send + Sync {
    fn current_network(&self) -> NetworkState;
}

impl<F> NetworkProvider for F
where
    F: Fn() -> NetworkState + Send + Sync,
{
    fn current_network(&self) -> NetworkState {
        self()
    }
}

/// Provider pinned to one network, for single-network deployments and tests
pub struct FixedNetwork(pub NetworkId);

impl FixedNetwork {
    pub fn new(id: impl Into<NetworkId>) -> Self {
        FixedNetwork(id.into())
    }
}

impl NetworkProvider for FixedNetwork {
    fn current_network(&self) -> NetworkState {
        NetworkState::Online(self.0.clone())
    }
}
