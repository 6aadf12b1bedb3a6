pub mod errors;
pub mod events;
pub mod ids;
pub mod protocol;

pub use errors::DispatchError;
pub use events::{EventScope, SubjectEvent};
pub use ids::ClientId;
pub use protocol::{IncomingMessage, OutgoingMessage, NO_SUBSCRIPTION, SERVER_PUSH};
