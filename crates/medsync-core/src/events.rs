use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Actions emitted by collection-style subjects.
pub const ENTITY_ADDED: &str = "added";
pub const ENTITY_UPDATED: &str = "updated";
pub const ENTITY_DELETED: &str = "deleted";

/// Which clients an event is intended for. Filtered subjects compare
/// this against the subscription's parameters in `matches`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventScope {
    /// Deliverable to every subscriber of the subject.
    All,
    /// Scoped to the entities of one owning user.
    User(i64),
}

/// The unit an emitting subject hands to the dispatcher.
#[derive(Clone, Debug)]
pub struct SubjectEvent {
    pub action: String,
    pub scope: EventScope,
    pub payload: Value,
}

impl SubjectEvent {
    pub fn broadcast(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            scope: EventScope::All,
            payload,
        }
    }

    pub fn for_user(user_id: i64, action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            scope: EventScope::User(user_id),
            payload,
        }
    }
}

/// Payload for an `added` event on a collection subject.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityAddedPayload {
    pub id: i64,
    pub added_entity: Value,
}

/// Payload for an `updated` event on a collection subject.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdatedPayload {
    pub id: i64,
    pub updated_entity: Value,
}

/// Payload for a `deleted` event on a collection subject.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDeletedPayload {
    pub id: i64,
}
