//! One [`DeviceClient`] per endpoint.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::client::{DeviceClient, SharedLock};
use crate::config::ClientSettings;
use crate::descriptor::ConnectionDescriptor;

/// How far the mutual exclusion of a client reaches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// Operations are serialized per endpoint only.
    #[default]
    PerEndpoint,
    /// Every client of the registry shares one lock; no two operations
    /// overlap on any link.
    Global,
}

/// Maps each [`ConnectionDescriptor`] to a single shared client.
#[derive(Debug)]
pub struct EndpointRegistry {
    clients: Mutex<HashMap<ConnectionDescriptor, Arc<DeviceClient>>>,
    settings: ClientSettings,
    shared: Option<SharedLock>,
}

impl EndpointRegistry {
    pub fn new(settings: ClientSettings, scope: LockScope) -> Self {
        let shared = match scope {
            LockScope::PerEndpoint => None,
            LockScope::Global => Some(Arc::new(AsyncMutex::new(()))),
        };
        Self {
            clients: Mutex::new(HashMap::new()),
            settings,
            shared,
        }
    }

    pub fn scope(&self) -> LockScope {
        match self.shared {
            Some(_) => LockScope::Global,
            None => LockScope::PerEndpoint,
        }
    }

    /// Return the client for `descriptor`, creating it on first use.
    ///
    /// Lookup and insertion happen under one lock, so concurrent first
    /// resolutions of a descriptor all get the same client.
    pub fn resolve(&self, descriptor: &ConnectionDescriptor) -> Arc<DeviceClient> {
        let mut clients = self.clients();
        if let Some(client) = clients.get(descriptor) {
            return client.clone();
        }

        let mut client = DeviceClient::new(descriptor.clone(), self.settings);
        if let Some(lock) = &self.shared {
            client = client.with_shared_lock(lock.clone());
        }
        let client = Arc::new(client);
        info!("Created client for {descriptor}");
        clients.insert(descriptor.clone(), client.clone());

        client
    }

    /// Lookup without creating.
    pub fn get(&self, descriptor: &ConnectionDescriptor) -> Option<Arc<DeviceClient>> {
        self.clients().get(descriptor).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<ConnectionDescriptor, Arc<DeviceClient>>> {
        // The map stays consistent even if a holder panicked.
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new(ClientSettings::default(), LockScope::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SerialSettings;

    #[test]
    fn same_descriptor_same_client() {
        let registry = EndpointRegistry::default();
        let descriptor = ConnectionDescriptor::tcp("10.0.0.5", 502, 1);

        let a = registry.resolve(&descriptor);
        let b = registry.resolve(&descriptor.clone());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        let other_unit = registry.resolve(&ConnectionDescriptor::tcp("10.0.0.5", 502, 2));
        assert!(!Arc::ptr_eq(&a, &other_unit));
        let other_framing =
            registry.resolve(&ConnectionDescriptor::rtu_over_tcp("10.0.0.5", 502, 1));
        assert!(!Arc::ptr_eq(&a, &other_framing));
        registry.resolve(&ConnectionDescriptor::serial(SerialSettings::new("/dev/ttyUSB0"), 1));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn get_does_not_create() {
        let registry = EndpointRegistry::default();
        let descriptor = ConnectionDescriptor::tcp("10.0.0.5", 502, 1);
        assert!(registry.is_empty());
        assert!(registry.get(&descriptor).is_none());

        let client = registry.resolve(&descriptor);
        assert!(Arc::ptr_eq(&registry.get(&descriptor).unwrap(), &client));
    }

    #[test]
    fn concurrent_first_resolution() {
        let registry = Arc::new(EndpointRegistry::default());
        let descriptor = ConnectionDescriptor::tcp("10.0.0.7", 502, 3);

        let clients = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let descriptor = descriptor.clone();
                std::thread::spawn(move || registry.resolve(&descriptor))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn scope() {
        assert_eq!(EndpointRegistry::default().scope(), LockScope::PerEndpoint);
        let registry = EndpointRegistry::new(ClientSettings::default(), LockScope::Global);
        assert_eq!(registry.scope(), LockScope::Global);
    }
}
