use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use medsync_core::SubjectEvent;

use crate::subject::Subject;

/// A subject event tagged with its originating subject's title, as carried
/// on the aggregated channel between all subjects and the fan-out loop.
#[derive(Clone, Debug)]
pub struct TaggedEvent {
    pub subject: String,
    pub event: SubjectEvent,
}

/// Emission handle given to a subject at registration. All sinks feed the
/// same bounded channel; the dispatcher's fan-out loop is the sole reader.
#[derive(Clone)]
pub struct EventSink {
    subject: String,
    tx: mpsc::Sender<TaggedEvent>,
}

impl EventSink {
    /// Push an event onto the dispatch channel. Awaits when the buffer is
    /// full: backpressure onto the emitting collaborator, not an error.
    pub async fn emit(&self, event: SubjectEvent) {
        let tagged = TaggedEvent {
            subject: self.subject.clone(),
            event,
        };
        if self.tx.send(tagged).await.is_err() {
            tracing::warn!(subject = %self.subject, "dispatcher stopped, event dropped");
        }
    }
}

/// Registry of subjects owned by a dispatcher. Built once at startup;
/// `Dispatcher::new` consumes it, after which no further registration is
/// possible.
pub struct SubjectRegistry {
    by_title: HashMap<String, Arc<dyn Subject>>,
    event_tx: mpsc::Sender<TaggedEvent>,
    event_rx: Option<mpsc::Receiver<TaggedEvent>>,
}

impl SubjectRegistry {
    /// Create a registry whose aggregated event channel buffers up to
    /// `event_capacity` pending events before emitters block.
    pub fn new(event_capacity: usize) -> Self {
        let (event_tx, event_rx) = mpsc::channel(event_capacity);
        Self {
            by_title: HashMap::new(),
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Emission handle for the subject with the given title.
    pub fn sink(&self, title: impl Into<String>) -> EventSink {
        EventSink {
            subject: title.into(),
            tx: self.event_tx.clone(),
        }
    }

    /// Register a subject under its title. Titles are unique: re-registering
    /// a title replaces the previous subject and logs a warning.
    pub fn register(&mut self, subject: Arc<dyn Subject>) {
        let title = subject.title().to_string();
        if self.by_title.insert(title.clone(), subject).is_some() {
            tracing::warn!(subject = %title, "subject title re-registered, replacing");
        }
    }

    /// Look up a subject by title.
    pub fn get(&self, title: &str) -> Option<Arc<dyn Subject>> {
        self.by_title.get(title).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }

    /// Hand the aggregated receiver to the fan-out loop. Yields `Some` once.
    pub(crate) fn take_receiver(&mut self) -> Option<mpsc::Receiver<TaggedEvent>> {
        self.event_rx.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionSubject;

    #[test]
    fn register_and_lookup() {
        let mut registry = SubjectRegistry::new(8);
        CollectionSubject::register("medications", &mut registry);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("medications").is_some());
        assert!(registry.get("doses").is_none());
    }

    #[test]
    fn receiver_taken_once() {
        let mut registry = SubjectRegistry::new(8);
        assert!(registry.take_receiver().is_some());
        assert!(registry.take_receiver().is_none());
    }

    #[tokio::test]
    async fn sink_tags_events_with_subject_title() {
        let mut registry = SubjectRegistry::new(8);
        let sink = registry.sink("medications");
        let mut rx = registry.take_receiver().unwrap();

        sink.emit(SubjectEvent::broadcast("added", serde_json::json!({"id": 1})))
            .await;

        let tagged = rx.recv().await.unwrap();
        assert_eq!(tagged.subject, "medications");
        assert_eq!(tagged.event.action, "added");
    }

    #[tokio::test]
    async fn emission_order_preserved() {
        let mut registry = SubjectRegistry::new(8);
        let sink = registry.sink("medications");
        let mut rx = registry.take_receiver().unwrap();

        for i in 0..5 {
            sink.emit(SubjectEvent::broadcast("added", serde_json::json!({"id": i})))
                .await;
        }
        for i in 0..5 {
            let tagged = rx.recv().await.unwrap();
            assert_eq!(tagged.event.payload["id"], i);
        }
    }
}
