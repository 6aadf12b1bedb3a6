use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use medsync_core::events::{
    EntityAddedPayload, EntityDeletedPayload, EntityUpdatedPayload, ENTITY_ADDED, ENTITY_DELETED,
    ENTITY_UPDATED,
};
use medsync_core::{DispatchError, SubjectEvent};

use crate::registry::{EventSink, SubjectRegistry};
use crate::subject::{Subject, SubscriptionParams};

/// A subject broadcasting add/update/delete events for a simple entity
/// collection. Matching is unconditional: every subscriber receives every
/// event, regardless of subscription parameters.
pub struct CollectionSubject {
    title: String,
    sink: EventSink,
}

impl CollectionSubject {
    /// Create a collection subject and register it with the registry.
    pub fn register(title: impl Into<String>, registry: &mut SubjectRegistry) -> Arc<Self> {
        let title = title.into();
        let subject = Arc::new(Self {
            sink: registry.sink(title.clone()),
            title,
        });
        registry.register(subject.clone());
        subject
    }

    /// Notify subscribers that a new entity has been added.
    pub async fn entity_added(&self, entity_id: i64, added_entity: Value) {
        self.emit(ENTITY_ADDED, EntityAddedPayload { id: entity_id, added_entity })
            .await;
    }

    /// Notify subscribers that an entity has been updated.
    pub async fn entity_updated(&self, entity_id: i64, updated_entity: Value) {
        self.emit(ENTITY_UPDATED, EntityUpdatedPayload { id: entity_id, updated_entity })
            .await;
    }

    /// Notify subscribers that an entity has been deleted.
    pub async fn entity_deleted(&self, entity_id: i64) {
        self.emit(ENTITY_DELETED, EntityDeletedPayload { id: entity_id }).await;
    }

    async fn emit(&self, action: &str, payload: impl Serialize) {
        match serde_json::to_value(payload) {
            Ok(payload) => self.sink.emit(SubjectEvent::broadcast(action, payload)).await,
            Err(err) => {
                tracing::error!(subject = %self.title, %err, "failed to encode event payload")
            }
        }
    }
}

impl Subject for CollectionSubject {
    fn title(&self) -> &str {
        &self.title
    }

    fn parse_params(&self, _raw: &Map<String, Value>) -> Result<SubscriptionParams, DispatchError> {
        Ok(SubscriptionParams::Unfiltered)
    }

    fn matches(&self, _event: &SubjectEvent, _params: &SubscriptionParams) -> bool {
        true
    }
}
