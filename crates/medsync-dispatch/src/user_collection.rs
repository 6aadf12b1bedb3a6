use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use medsync_core::events::{
    EntityAddedPayload, EntityDeletedPayload, EntityUpdatedPayload, ENTITY_ADDED, ENTITY_DELETED,
    ENTITY_UPDATED,
};
use medsync_core::{DispatchError, EventScope, SubjectEvent};

use crate::registry::{EventSink, SubjectRegistry};
use crate::subject::{Subject, SubscriptionParams};

/// A collection subject whose entities belong to a single user. Clients
/// subscribe with a `userId` parameter and only receive events for that
/// user's entities.
pub struct UserCollectionSubject {
    title: String,
    sink: EventSink,
}

impl UserCollectionSubject {
    /// Create a user-scoped subject and register it with the registry.
    pub fn register(title: impl Into<String>, registry: &mut SubjectRegistry) -> Arc<Self> {
        let title = title.into();
        let subject = Arc::new(Self {
            sink: registry.sink(title.clone()),
            title,
        });
        registry.register(subject.clone());
        subject
    }

    /// Notify the owning user's subscribers of a new entity.
    pub async fn entity_added(&self, user_id: i64, entity_id: i64, added_entity: Value) {
        self.emit_payload(user_id, ENTITY_ADDED, EntityAddedPayload { id: entity_id, added_entity })
            .await;
    }

    /// Notify the owning user's subscribers of an updated entity.
    pub async fn entity_updated(&self, user_id: i64, entity_id: i64, updated_entity: Value) {
        self.emit_payload(
            user_id,
            ENTITY_UPDATED,
            EntityUpdatedPayload { id: entity_id, updated_entity },
        )
        .await;
    }

    /// Notify the owning user's subscribers of a deleted entity.
    pub async fn entity_deleted(&self, user_id: i64, entity_id: i64) {
        self.emit_payload(user_id, ENTITY_DELETED, EntityDeletedPayload { id: entity_id })
            .await;
    }

    /// Push an arbitrary action/payload scoped to one user. Used for
    /// non-CRUD notifications such as recomputed dose summaries.
    pub async fn emit(&self, user_id: i64, action: impl Into<String>, payload: Value) {
        self.sink.emit(SubjectEvent::for_user(user_id, action, payload)).await;
    }

    async fn emit_payload(&self, user_id: i64, action: &str, payload: impl Serialize) {
        match serde_json::to_value(payload) {
            Ok(payload) => {
                self.sink.emit(SubjectEvent::for_user(user_id, action, payload)).await
            }
            Err(err) => {
                tracing::error!(subject = %self.title, %err, "failed to encode event payload")
            }
        }
    }
}

impl Subject for UserCollectionSubject {
    fn title(&self) -> &str {
        &self.title
    }

    fn parse_params(&self, raw: &Map<String, Value>) -> Result<SubscriptionParams, DispatchError> {
        match raw.get("userId") {
            Some(Value::Number(n)) => match n.as_i64() {
                Some(user_id) => Ok(SubscriptionParams::ForUser { user_id }),
                None => Err(DispatchError::BadRequest(format!(
                    "Invalid value for field 'userId' in subscription parameters for subject {}: expected integer",
                    self.title
                ))),
            },
            Some(other) => Err(DispatchError::BadRequest(format!(
                "Invalid type for field 'userId' in subscription parameters for subject {}: expected number, got {}",
                self.title,
                json_type(other)
            ))),
            None => Err(DispatchError::BadRequest(format!(
                "Missing field 'userId' in subscription parameters for subject {}",
                self.title
            ))),
        }
    }

    fn matches(&self, event: &SubjectEvent, params: &SubscriptionParams) -> bool {
        match (event.scope, params) {
            (EventScope::User(owner), SubscriptionParams::ForUser { user_id }) => owner == *user_id,
            _ => false,
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
