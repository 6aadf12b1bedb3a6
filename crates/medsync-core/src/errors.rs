use crate::protocol::{OutgoingMessage, NO_SUBSCRIPTION};

/// Client-facing, per-request dispatch failures. None of these terminate
/// the connection or the fan-out loop.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Undefined action {0}")]
    UndefinedAction(String),

    #[error("Undefined subject {0}")]
    UndefinedSubject(String),

    #[error("This client is already subscribed to subject {0} with the same subscription parameters")]
    AlreadySubscribed(String),

    /// Catch-all wrap of an unexpected internal failure.
    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    /// Stable wire code for the error payload.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::UndefinedAction(_) => "undefined_action",
            Self::UndefinedSubject(_) => "undefined_subject",
            Self::AlreadySubscribed(_) => "already_subscribed",
            Self::Internal(_) => "error",
        }
    }

    /// Convert into an error reply correlated to the originating request.
    pub fn into_message(self, request_id: i64) -> OutgoingMessage {
        OutgoingMessage {
            subscription_id: NO_SUBSCRIPTION,
            action: "error".into(),
            request_id,
            payload: serde_json::json!({
                "message": self.to_string(),
                "code": self.code(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_strings() {
        assert_eq!(DispatchError::BadRequest("x".into()).code(), "bad_request");
        assert_eq!(DispatchError::UndefinedAction("x".into()).code(), "undefined_action");
        assert_eq!(DispatchError::UndefinedSubject("x".into()).code(), "undefined_subject");
        assert_eq!(DispatchError::AlreadySubscribed("x".into()).code(), "already_subscribed");
        assert_eq!(DispatchError::Internal("x".into()).code(), "error");
    }

    #[test]
    fn undefined_action_message_text() {
        let err = DispatchError::UndefinedAction("frobnicate".into());
        assert_eq!(err.to_string(), "Undefined action frobnicate");
    }

    #[test]
    fn error_reply_shape() {
        let msg = DispatchError::UndefinedAction("frobnicate".into()).into_message(42);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["subscriptionId"], -1);
        assert_eq!(json["action"], "error");
        assert_eq!(json["requestId"], 42);
        assert_eq!(json["payload"]["code"], "undefined_action");
        assert_eq!(json["payload"]["message"], "Undefined action frobnicate");
    }

    #[test]
    fn already_subscribed_names_subject() {
        let err = DispatchError::AlreadySubscribed("medications".into());
        assert!(err.to_string().contains("medications"));
        assert!(err.to_string().contains("already subscribed"));
    }
}
