use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use medsync_core::{ClientId, OutgoingMessage, SubjectEvent};

use crate::client::{Client, Delivery};
use crate::registry::{SubjectRegistry, TaggedEvent};
use crate::subject::Subject;

/// Tuning knobs for the dispatcher.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Capacity of each client's outgoing queue.
    pub outgoing_capacity: usize,
    /// How long fan-out delivery may block on a full client queue before
    /// the client is disconnected.
    pub send_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            outgoing_capacity: 64,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the subject registry and the client registry, and runs the single
/// fan-out loop routing subject events to matching client queues.
///
/// Lifecycle: subjects are registered into the `SubjectRegistry` first;
/// `new` consumes the registry (no registration after that), and `run`
/// starts the loop, which runs for the process lifetime.
pub struct Dispatcher {
    subjects: Arc<SubjectRegistry>,
    clients: DashMap<ClientId, Arc<Client>>,
    config: DispatcherConfig,
    event_rx: Mutex<Option<mpsc::Receiver<TaggedEvent>>>,
}

impl Dispatcher {
    pub fn new(subjects: SubjectRegistry) -> Self {
        Self::with_config(subjects, DispatcherConfig::default())
    }

    pub fn with_config(mut subjects: SubjectRegistry, config: DispatcherConfig) -> Self {
        let event_rx = subjects.take_receiver();
        Self {
            subjects: Arc::new(subjects),
            clients: DashMap::new(),
            config,
            event_rx: Mutex::new(event_rx),
        }
    }

    /// Construct a new client bound to this dispatcher and register it.
    /// Returns the client and the receiving end of its outgoing queue,
    /// which the connection's writer task drains.
    pub fn create_client(&self) -> (Arc<Client>, mpsc::Receiver<OutgoingMessage>) {
        let (tx, rx) = mpsc::channel(self.config.outgoing_capacity);
        let client = Arc::new(Client::new(ClientId::new(), self.subjects.clone(), tx));
        self.clients.insert(client.id().clone(), client.clone());
        tracing::debug!(client_id = %client.id(), clients = self.clients.len(), "client registered");
        (client, rx)
    }

    /// Deregister a client; its pending outgoing messages are discarded
    /// when the connection drops the queue receiver.
    pub fn remove_client(&self, id: &ClientId) {
        if self.clients.remove(id).is_some() {
            tracing::debug!(client_id = %id, clients = self.clients.len(), "client removed");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// The fan-out loop. Runs once, forever: waits on the aggregated subject
    /// event channel and routes each event to every matching client queue.
    /// Events from one subject reach all matching clients in emission order.
    pub async fn run(self: Arc<Self>) {
        let Some(mut event_rx) = self.event_rx.lock().take() else {
            tracing::error!("dispatcher fan-out loop already started");
            return;
        };

        tracing::info!(subjects = self.subjects.len(), "dispatcher running");

        while let Some(TaggedEvent { subject, event }) = event_rx.recv().await {
            let Some(subject) = self.subjects.get(&subject) else {
                tracing::warn!(subject = %subject, "event from unregistered subject dropped");
                continue;
            };
            self.fan_out(subject.as_ref(), &event).await;
        }

        // All sinks dropped; only happens when the subjects themselves go away.
        tracing::info!("dispatcher event channel closed, fan-out loop exiting");
    }

    async fn fan_out(&self, subject: &dyn Subject, event: &SubjectEvent) {
        // Snapshot so no registry shard lock is held across a send await.
        let clients: Vec<Arc<Client>> = self.clients.iter().map(|e| e.value().clone()).collect();
        let mut stalled: Vec<ClientId> = Vec::new();

        for client in clients {
            let Some(subscription_id) = client.matching_subscription(subject, event) else {
                continue;
            };

            let msg = OutgoingMessage::push(subscription_id, event.action.clone(), event.payload.clone());
            match client.deliver(msg, self.config.send_timeout).await {
                Delivery::Sent => {}
                Delivery::Dropped => {
                    tracing::warn!(
                        client_id = %client.id(),
                        subject = subject.title(),
                        "outgoing queue stalled, disconnecting client"
                    );
                    stalled.push(client.id().clone());
                }
            }
        }

        for id in stalled {
            self.remove_client(&id);
        }
    }
}
