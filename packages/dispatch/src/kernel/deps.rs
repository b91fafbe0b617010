//! Server dependencies shared by the HTTP layer and the sweeper.

use std::sync::Arc;

use crate::domains::dispatch::{DispatchSettings, Dispatcher};
use crate::domains::helpers::HelperRegistry;
use crate::kernel::store::{BaseDispatchStore, MemoryStore};
use crate::kernel::stream_hub::StreamHub;

/// Everything a request handler or background task needs.
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseDispatchStore>,
    /// In-process pub/sub hub for real-time streaming to SSE endpoints
    pub stream_hub: StreamHub,
    pub dispatcher: Dispatcher,
    pub registry: HelperRegistry,
}

impl ServerDeps {
    pub fn new(store: Arc<dyn BaseDispatchStore>, settings: DispatchSettings) -> Self {
        let stream_hub = StreamHub::new();
        Self {
            dispatcher: Dispatcher::new(store.clone(), stream_hub.clone(), settings),
            registry: HelperRegistry::new(store.clone(), stream_hub.clone()),
            store,
            stream_hub,
        }
    }

    /// Dependencies backed by a fresh [`MemoryStore`].
    pub fn in_memory(settings: DispatchSettings) -> Self {
        Self::new(Arc::new(MemoryStore::new()), settings)
    }
}
