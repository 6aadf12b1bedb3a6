use serde_json::{Map, Value};

use medsync_core::{DispatchError, SubjectEvent};

/// Normalized filter parameters attached to a subscription. Subjects parse
/// raw client data into this at subscribe time and interpret it again in
/// `matches`. Equality is used to reject duplicate subscriptions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionParams {
    /// No filtering; every event on the subject matches.
    Unfiltered,
    /// Restrict delivery to events owned by one user.
    ForUser { user_id: i64 },
}

/// A named source of domain-change events with pluggable matching logic.
///
/// Subjects are registered into a `SubjectRegistry` before the dispatcher
/// starts and live for the process lifetime. Emission happens through the
/// `EventSink` a subject receives at registration; the dispatcher stays
/// ignorant of concrete subject types.
pub trait Subject: Send + Sync {
    /// Stable identifier clients use to address the subject.
    fn title(&self) -> &str;

    /// Validate and normalize client-supplied filter data.
    fn parse_params(&self, raw: &Map<String, Value>) -> Result<SubscriptionParams, DispatchError>;

    /// Whether an event should be delivered to a subscription holding `params`.
    /// Pure predicate; called by the fan-out loop for every candidate client.
    fn matches(&self, event: &SubjectEvent, params: &SubscriptionParams) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_equality() {
        assert_eq!(SubscriptionParams::Unfiltered, SubscriptionParams::Unfiltered);
        assert_eq!(
            SubscriptionParams::ForUser { user_id: 3 },
            SubscriptionParams::ForUser { user_id: 3 }
        );
        assert_ne!(
            SubscriptionParams::ForUser { user_id: 3 },
            SubscriptionParams::ForUser { user_id: 4 }
        );
        assert_ne!(SubscriptionParams::Unfiltered, SubscriptionParams::ForUser { user_id: 3 });
    }
}
