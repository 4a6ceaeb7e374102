//! Network Selector
//!
//! Holds the network every request is evaluated against. The value is set
//! once at startup and can be switched through the `btc_network` request.

use std::sync::RwLock;

use crate::types::BtcNetwork;

/// Source of the currently configured network
pub trait NetworkSelector: Send + Sync {
    fn current_network(&self) -> BtcNetwork;
}

/// Process-local network store
#[derive(Debug, Default)]
pub struct NetworkStore {
    network: RwLock<BtcNetwork>,
}

impl NetworkStore {
    pub fn new(network: BtcNetwork) -> Self {
        Self {
            network: RwLock::new(network),
        }
    }

    /// Switch networks, returning the previous value
    pub fn set(&self, network: BtcNetwork) -> BtcNetwork {
        match self.network.write() {
            Ok(mut current) => std::mem::replace(&mut *current, network),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), network),
        }
    }
}

impl NetworkSelector for NetworkStore {
    fn current_network(&self) -> BtcNetwork {
        self.network
            .read()
            .map(|n| *n)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let store = NetworkStore::new(BtcNetwork::Mainnet);
        assert_eq!(store.current_network(), BtcNetwork::Mainnet);

        let previous = store.set(BtcNetwork::Testnet);
        assert_eq!(previous, BtcNetwork::Mainnet);
        assert_eq!(store.current_network(), BtcNetwork::Testnet);
    }
}
