pub mod error;
pub mod handlers;
pub mod server;
pub mod subjects;
pub mod ws;

pub use server::{start, AppState, ServerConfig, ServerHandle};
pub use subjects::DomainSubjects;
