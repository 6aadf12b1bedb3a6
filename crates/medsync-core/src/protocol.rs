use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `subscriptionId` value for messages not tied to any subscription
/// (direct replies and errors).
pub const NO_SUBSCRIPTION: i64 = -1;

/// `requestId` value for server-initiated pushes not correlated to any
/// client request.
pub const SERVER_PUSH: i64 = -1;

/// A control message sent by a client over the wire.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    pub action: String,
    #[serde(default)]
    pub request_id: i64,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// A message sent from the dispatcher to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub subscription_id: i64,
    pub action: String,
    pub request_id: i64,
    pub payload: Value,
}

impl OutgoingMessage {
    /// A direct reply correlated to a client request.
    pub fn reply(action: impl Into<String>, request_id: i64, payload: Value) -> Self {
        Self {
            subscription_id: NO_SUBSCRIPTION,
            action: action.into(),
            request_id,
            payload,
        }
    }

    /// A server push delivered through a subscription.
    pub fn push(subscription_id: i64, action: impl Into<String>, payload: Value) -> Self {
        Self {
            subscription_id,
            action: action.into(),
            request_id: SERVER_PUSH,
            payload,
        }
    }
}
