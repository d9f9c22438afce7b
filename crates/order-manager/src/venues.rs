//! Venue registry
//!
//! Explicitly injected map of exchange clients, shared by the controller,
//! reconciler and recovery. No process-wide singletons.

use std::collections::BTreeMap;
use std::sync::Arc;

use argus_core::ExchangeId;
use argus_ports::ExchangeClient;

use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub struct VenueRegistry {
    clients: Arc<BTreeMap<ExchangeId, Arc<dyn ExchangeClient>>>,
}

impl VenueRegistry {
    pub fn new(clients: impl IntoIterator<Item = Arc<dyn ExchangeClient>>) -> Self {
        let clients = clients.into_iter().map(|c| (c.id().clone(), c)).collect();
        Self {
            clients: Arc::new(clients),
        }
    }

    pub fn get(&self, exchange: &ExchangeId) -> Result<&Arc<dyn ExchangeClient>> {
        self.clients
            .get(exchange)
            .ok_or_else(|| Error::UnknownExchange(exchange.clone()))
    }

    pub fn ids(&self) -> Vec<ExchangeId> {
        self.clients.keys().cloned().collect()
    }

    pub fn clients(&self) -> impl Iterator<Item = &Arc<dyn ExchangeClient>> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
