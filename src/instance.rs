//! The module that contains the coordinator owning every in-process participant of one agreement
//! instance: the shared registry, one storage per node, and the handles of the running nodes.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::api::{AgreementApi, Transport};
use crate::configurations::Settings;
use crate::error::PaxosError;
use crate::node::{Node, NodeHandle};
use crate::registry::{ParticipantRegistry, UnreliableTransport};
use crate::retry::{NoopRetry, RetryCoordinator};
use crate::storage::MemoryStorage;

/// An instance of the agreement running entirely inside this process. Nodes spawned through it
/// share one registry and one agreement api; each gets a fresh uid and its own storage.
pub struct Instance<T> {
    settings: Settings,

    api: Arc<dyn AgreementApi<T>>,

    registry: Arc<ParticipantRegistry<T>>,

    transport: Arc<dyn Transport<T>>,

    handles: Vec<NodeHandle<T>>,
}

impl<T> Instance<T>
where
    T: Clone + Debug + Send + 'static,
{
    /// An instance over the plain in-process transport: every send arrives, in order.
    pub fn new(settings: Settings, api: Arc<dyn AgreementApi<T>>) -> Self {
        let registry = Arc::new(ParticipantRegistry::new());
        Instance {
            settings,
            api,
            registry: registry.clone(),
            transport: registry,
            handles: Vec::new(),
        }
    }

    /// An instance over a destabilized transport which drops the given fraction of deliveries
    /// and delays the rest by a uniform amount between the two bounds.
    pub fn destabilized(
        settings: Settings,
        api: Arc<dyn AgreementApi<T>>,
        drop_probability: f64,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        let registry = Arc::new(ParticipantRegistry::new());
        let transport = Arc::new(UnreliableTransport::new(
            registry.clone(),
            drop_probability,
            min_delay,
            max_delay,
        ));
        Instance {
            settings,
            api,
            registry,
            transport,
            handles: Vec::new(),
        }
    }

    /// The registry behind this instance, for subscribing extra observers or error streams.
    pub fn registry(&self) -> Arc<ParticipantRegistry<T>> {
        self.registry.clone()
    }

    /// Spawns one node with a fresh uid and wires it up. Returns the new node's uid.
    pub fn spawn_node(&mut self) -> Result<String, PaxosError> {
        self.spawn_node_with_retry(Box::new(NoopRetry))
    }

    /// Spawns one node whose proposer re-attempts rounds on the given schedule.
    pub fn spawn_node_with_retry(
        &mut self,
        retry: Box<dyn RetryCoordinator>,
    ) -> Result<String, PaxosError> {
        let uid = Uuid::new_v4().to_string();
        let node = Node::new(
            &uid,
            self.settings.clone(),
            self.transport.clone(),
            Arc::new(MemoryStorage::new()),
            self.api.clone(),
            retry,
        );
        self.handles.push(node.setup_bindings()?);
        Ok(uid)
    }

    pub fn handles(&self) -> &[NodeHandle<T>] {
        &self.handles
    }

    /// Kicks the decision process on the first spawned node. The others still self-elect if the
    /// kicked round dies out.
    pub fn commence_decision_process(&self) {
        if let Some(handle) = self.handles.first() {
            handle.commence_decision_process();
        }
    }
}

impl<T> Instance<T> {
    /// Disposes every node and disconnects the registry. Safe to call more than once.
    pub fn dispose(&mut self) {
        for handle in &mut self.handles {
            handle.dispose();
        }
        self.registry.shutdown();
    }
}

impl<T> Drop for Instance<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
