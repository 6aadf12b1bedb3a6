use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use medsync_core::{ClientId, DispatchError, IncomingMessage, OutgoingMessage, SubjectEvent};

use crate::registry::SubjectRegistry;
use crate::subject::{Subject, SubscriptionParams};

/// A client's standing interest in a subject.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: i64,
    pub subject_title: String,
    pub params: SubscriptionParams,
}

/// Subscription IDs are a per-client monotonic counter, never reused even
/// across unsubscribes, so a stale ID can never address a later subscription.
struct SubscriptionTable {
    entries: Vec<Subscription>,
    next_id: i64,
}

/// Outcome of a fan-out delivery attempt.
pub(crate) enum Delivery {
    Sent,
    /// Queue stalled past the timeout or the connection is gone; the
    /// dispatcher should drop the client.
    Dropped,
}

/// A connected session. The subscription table is mutated only by the
/// connection's reader task (through `handle_incoming`) and read by the
/// fan-out loop under the lock.
pub struct Client {
    id: ClientId,
    subjects: Arc<SubjectRegistry>,
    subscriptions: Mutex<SubscriptionTable>,
    outgoing: mpsc::Sender<OutgoingMessage>,
}

impl Client {
    pub(crate) fn new(
        id: ClientId,
        subjects: Arc<SubjectRegistry>,
        outgoing: mpsc::Sender<OutgoingMessage>,
    ) -> Self {
        Self {
            id,
            subjects,
            subscriptions: Mutex::new(SubscriptionTable {
                entries: Vec::new(),
                next_id: 1,
            }),
            outgoing,
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Subscribe to a subject by title. Fails with `UndefinedSubject` for an
    /// unknown title and `AlreadySubscribed` when an identical
    /// (subject, params) subscription exists. Returns the new subscription ID.
    pub fn subscribe(
        &self,
        subject_title: &str,
        raw_params: &serde_json::Map<String, Value>,
    ) -> Result<i64, DispatchError> {
        let subject = self
            .subjects
            .get(subject_title)
            .ok_or_else(|| DispatchError::UndefinedSubject(subject_title.to_string()))?;

        let params = subject.parse_params(raw_params)?;

        let mut table = self.subscriptions.lock();
        if table
            .entries
            .iter()
            .any(|s| s.subject_title == subject_title && s.params == params)
        {
            return Err(DispatchError::AlreadySubscribed(subject_title.to_string()));
        }

        let id = table.next_id;
        table.next_id += 1;
        table.entries.push(Subscription {
            id,
            subject_title: subject_title.to_string(),
            params,
        });

        tracing::debug!(client_id = %self.id, subject = subject_title, subscription_id = id, "subscribed");
        Ok(id)
    }

    /// Remove the subscription with the given ID. Unknown IDs are a no-op;
    /// remaining subscriptions keep their IDs.
    pub fn unsubscribe(&self, subscription_id: i64) {
        let mut table = self.subscriptions.lock();
        let before = table.entries.len();
        table.entries.retain(|s| s.id != subscription_id);
        if table.entries.len() < before {
            tracing::debug!(client_id = %self.id, subscription_id, "unsubscribed");
        }
    }

    /// Snapshot of the client's subscriptions, in subscription order.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().entries.clone()
    }

    /// First subscription to the event's subject whose params match the
    /// event. At most one delivery per client per event.
    pub(crate) fn matching_subscription(
        &self,
        subject: &dyn Subject,
        event: &SubjectEvent,
    ) -> Option<i64> {
        let table = self.subscriptions.lock();
        table
            .entries
            .iter()
            .find(|s| s.subject_title == subject.title() && subject.matches(event, &s.params))
            .map(|s| s.id)
    }

    /// Handle a decoded control message from this client's reader task.
    /// Validation failures become error replies on this client's own queue;
    /// they never reach the fan-out loop.
    pub async fn handle_incoming(&self, msg: IncomingMessage) {
        let action = msg.action.clone();
        match action.as_str() {
            "subscribe" => self.handle_subscribe(msg).await,
            "unsubscribe" => self.handle_unsubscribe(msg).await,
            other => {
                self.send(DispatchError::UndefinedAction(other.to_string()).into_message(msg.request_id))
                    .await;
            }
        }
    }

    async fn handle_subscribe(&self, msg: IncomingMessage) {
        let subject_title = match msg.payload.get("subject") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return self
                    .send_error(
                        DispatchError::BadRequest(format!(
                            "Invalid type for field 'subject' in payload of subscribe action: expected string, got {}",
                            json_type(other)
                        )),
                        msg.request_id,
                    )
                    .await;
            }
            None => {
                return self
                    .send_error(
                        DispatchError::BadRequest(
                            "Missing field 'subject' in payload of subscribe action".into(),
                        ),
                        msg.request_id,
                    )
                    .await;
            }
        };

        let raw_params = match msg.payload.get("subscriptionParams") {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return self
                    .send_error(
                        DispatchError::BadRequest(format!(
                            "Invalid type for field 'subscriptionParams' in payload of subscribe action: expected object, got {}",
                            json_type(other)
                        )),
                        msg.request_id,
                    )
                    .await;
            }
            None => {
                return self
                    .send_error(
                        DispatchError::BadRequest(
                            "Missing field 'subscriptionParams' in payload of subscribe action".into(),
                        ),
                        msg.request_id,
                    )
                    .await;
            }
        };

        match self.subscribe(&subject_title, &raw_params) {
            Ok(subscription_id) => {
                self.send(OutgoingMessage::reply(
                    "subscribe",
                    msg.request_id,
                    serde_json::json!({"subscriptionId": subscription_id}),
                ))
                .await;
            }
            Err(err) => self.send_error(err, msg.request_id).await,
        }
    }

    async fn handle_unsubscribe(&self, msg: IncomingMessage) {
        let subscription_id = match msg.payload.get("subscriptionId") {
            Some(Value::Number(n)) => match n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)) {
                Some(id) => id,
                None => {
                    return self
                        .send_error(
                            DispatchError::BadRequest(
                                "Invalid value for field 'subscriptionId' in payload of unsubscribe action".into(),
                            ),
                            msg.request_id,
                        )
                        .await;
                }
            },
            Some(other) => {
                return self
                    .send_error(
                        DispatchError::BadRequest(format!(
                            "Invalid type for field 'subscriptionId' in payload of unsubscribe action: expected number, got {}",
                            json_type(other)
                        )),
                        msg.request_id,
                    )
                    .await;
            }
            None => {
                return self
                    .send_error(
                        DispatchError::BadRequest(
                            "Missing field 'subscriptionId' in payload of unsubscribe action".into(),
                        ),
                        msg.request_id,
                    )
                    .await;
            }
        };

        self.unsubscribe(subscription_id);
        self.send(OutgoingMessage::reply("unsubscribe", msg.request_id, serde_json::json!({})))
            .await;
    }

    async fn send_error(&self, err: DispatchError, request_id: i64) {
        self.send(err.into_message(request_id)).await;
    }

    /// Enqueue a message on the bounded outgoing queue. Awaits when the
    /// queue is full: backpressure onto whichever task is producing.
    pub async fn send(&self, msg: OutgoingMessage) {
        if self.outgoing.send(msg).await.is_err() {
            tracing::debug!(client_id = %self.id, "connection gone, dropping outgoing message");
        }
    }

    /// Fan-out delivery: non-blocking first, then a bounded blocking send.
    /// A queue that stays full past `timeout` marks the client for removal.
    pub(crate) async fn deliver(&self, msg: OutgoingMessage, timeout: Duration) -> Delivery {
        match self.outgoing.try_send(msg) {
            Ok(()) => Delivery::Sent,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Dropped,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                match tokio::time::timeout(timeout, self.outgoing.send(msg)).await {
                    Ok(Ok(())) => Delivery::Sent,
                    _ => Delivery::Dropped,
                }
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionSubject;
    use crate::user_collection::UserCollectionSubject;

    fn setup() -> (Arc<SubjectRegistry>, Client, mpsc::Receiver<OutgoingMessage>) {
        let mut registry = SubjectRegistry::new(16);
        CollectionSubject::register("medications", &mut registry);
        UserCollectionSubject::register("doses", &mut registry);
        let subjects = Arc::new(registry);

        let (tx, rx) = mpsc::channel(16);
        let client = Client::new(ClientId::new(), subjects.clone(), tx);
        (subjects, client, rx)
    }

    fn params(json: Value) -> serde_json::Map<String, Value> {
        match json {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn subscribe_issues_monotonic_ids() {
        let (_subjects, client, _rx) = setup();

        let first = client.subscribe("medications", &params(serde_json::json!({}))).unwrap();
        let second = client
            .subscribe("doses", &params(serde_json::json!({"userId": 1})))
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn ids_never_reused_after_unsubscribe() {
        let (_subjects, client, _rx) = setup();

        let first = client.subscribe("medications", &params(serde_json::json!({}))).unwrap();
        client.unsubscribe(first);
        let second = client.subscribe("medications", &params(serde_json::json!({}))).unwrap();
        assert_eq!(second, 2);
    }

    #[test]
    fn duplicate_subscription_rejected() {
        let (_subjects, client, _rx) = setup();

        client.subscribe("medications", &params(serde_json::json!({}))).unwrap();
        let err = client
            .subscribe("medications", &params(serde_json::json!({})))
            .unwrap_err();
        assert_eq!(err, DispatchError::AlreadySubscribed("medications".into()));
        assert_eq!(client.subscriptions().len(), 1);
    }

    #[test]
    fn same_subject_different_params_allowed() {
        let (_subjects, client, _rx) = setup();

        client.subscribe("doses", &params(serde_json::json!({"userId": 1}))).unwrap();
        client.subscribe("doses", &params(serde_json::json!({"userId": 2}))).unwrap();
        assert_eq!(client.subscriptions().len(), 2);
    }

    #[test]
    fn subscribe_unknown_subject_fails() {
        let (_subjects, client, _rx) = setup();

        let err = client.subscribe("frobnicators", &params(serde_json::json!({}))).unwrap_err();
        assert_eq!(err, DispatchError::UndefinedSubject("frobnicators".into()));
    }

    #[test]
    fn unsubscribe_unknown_id_is_noop() {
        let (_subjects, client, _rx) = setup();

        client.subscribe("medications", &params(serde_json::json!({}))).unwrap();
        client.unsubscribe(999);
        assert_eq!(client.subscriptions().len(), 1);
    }

    #[test]
    fn unsubscribe_leaves_other_ids_unchanged() {
        let (_subjects, client, _rx) = setup();

        let a = client.subscribe("medications", &params(serde_json::json!({}))).unwrap();
        let b = client.subscribe("doses", &params(serde_json::json!({"userId": 1}))).unwrap();
        let c = client.subscribe("doses", &params(serde_json::json!({"userId": 2}))).unwrap();

        client.unsubscribe(b);

        let remaining: Vec<i64> = client.subscriptions().iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![a, c]);
    }

    #[test]
    fn matching_subscription_respects_params() {
        let (subjects, client, _rx) = setup();
        let doses = subjects.get("doses").unwrap();

        let sub = client.subscribe("doses", &params(serde_json::json!({"userId": 5}))).unwrap();

        let mine = SubjectEvent::for_user(5, "added", serde_json::json!({"id": 1}));
        let theirs = SubjectEvent::for_user(6, "added", serde_json::json!({"id": 2}));
        assert_eq!(client.matching_subscription(doses.as_ref(), &mine), Some(sub));
        assert_eq!(client.matching_subscription(doses.as_ref(), &theirs), None);
    }

    #[test]
    fn matching_skips_non_matching_subscription_to_same_subject() {
        let (subjects, client, _rx) = setup();
        let doses = subjects.get("doses").unwrap();

        let first = client.subscribe("doses", &params(serde_json::json!({"userId": 1}))).unwrap();
        let second = client.subscribe("doses", &params(serde_json::json!({"userId": 2}))).unwrap();

        let event = SubjectEvent::for_user(2, "added", serde_json::json!({"id": 1}));
        assert_eq!(client.matching_subscription(doses.as_ref(), &event), Some(second));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn incoming_subscribe_replies_with_id() {
        let (_subjects, client, mut rx) = setup();

        let msg: IncomingMessage = serde_json::from_str(
            r#"{"action":"subscribe","requestId":5,"payload":{"subject":"medications","subscriptionParams":{}}}"#,
        )
        .unwrap();
        client.handle_incoming(msg).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.action, "subscribe");
        assert_eq!(reply.subscription_id, -1);
        assert_eq!(reply.request_id, 5);
        assert_eq!(reply.payload["subscriptionId"], 1);
    }

    #[tokio::test]
    async fn incoming_subscribe_missing_subject_is_bad_request() {
        let (_subjects, client, mut rx) = setup();

        let msg: IncomingMessage = serde_json::from_str(
            r#"{"action":"subscribe","requestId":5,"payload":{"subscriptionParams":{}}}"#,
        )
        .unwrap();
        client.handle_incoming(msg).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.action, "error");
        assert_eq!(reply.request_id, 5);
        assert_eq!(reply.payload["code"], "bad_request");
    }

    #[tokio::test]
    async fn incoming_subscribe_wrong_param_type_is_bad_request() {
        let (_subjects, client, mut rx) = setup();

        let msg: IncomingMessage = serde_json::from_str(
            r#"{"action":"subscribe","requestId":2,"payload":{"subject":"medications","subscriptionParams":[]}}"#,
        )
        .unwrap();
        client.handle_incoming(msg).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.payload["code"], "bad_request");
        assert!(reply.payload["message"]
            .as_str()
            .unwrap()
            .contains("expected object, got array"));
    }

    #[tokio::test]
    async fn incoming_undefined_action_scenario() {
        let (_subjects, client, mut rx) = setup();

        let msg: IncomingMessage =
            serde_json::from_str(r#"{"action":"frobnicate","requestId":42,"payload":{}}"#).unwrap();
        client.handle_incoming(msg).await;

        let reply = rx.recv().await.unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["subscriptionId"], -1);
        assert_eq!(json["action"], "error");
        assert_eq!(json["requestId"], 42);
        assert_eq!(json["payload"]["code"], "undefined_action");
        assert_eq!(json["payload"]["message"], "Undefined action frobnicate");
    }

    #[tokio::test]
    async fn incoming_unsubscribe_acknowledges_and_removes() {
        let (_subjects, client, mut rx) = setup();

        let sub = client.subscribe("medications", &params(serde_json::json!({}))).unwrap();

        let raw = format!(
            r#"{{"action":"unsubscribe","requestId":9,"payload":{{"subscriptionId":{sub}}}}}"#
        );
        let msg: IncomingMessage = serde_json::from_str(&raw).unwrap();
        client.handle_incoming(msg).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.action, "unsubscribe");
        assert_eq!(reply.subscription_id, -1);
        assert_eq!(reply.request_id, 9);
        assert_eq!(reply.payload, serde_json::json!({}));
        assert!(client.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn incoming_unsubscribe_missing_id_is_bad_request() {
        let (_subjects, client, mut rx) = setup();

        let msg: IncomingMessage =
            serde_json::from_str(r#"{"action":"unsubscribe","requestId":3,"payload":{}}"#).unwrap();
        client.handle_incoming(msg).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.payload["code"], "bad_request");
        assert!(reply.payload["message"].as_str().unwrap().contains("subscriptionId"));
    }

    #[tokio::test]
    async fn deliver_times_out_on_stalled_queue() {
        let mut registry = SubjectRegistry::new(16);
        CollectionSubject::register("medications", &mut registry);
        let (tx, _rx) = mpsc::channel(1);
        let client = Client::new(ClientId::new(), Arc::new(registry), tx);

        let fill = OutgoingMessage::push(1, "added", serde_json::json!({}));
        assert!(matches!(
            client.deliver(fill.clone(), Duration::from_millis(10)).await,
            Delivery::Sent
        ));
        // Queue now full and nothing drains it.
        assert!(matches!(
            client.deliver(fill, Duration::from_millis(10)).await,
            Delivery::Dropped
        ));
    }
}
