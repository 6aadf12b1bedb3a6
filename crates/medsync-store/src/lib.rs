pub mod database;
pub mod dose_history;
pub mod doses;
pub mod error;
pub mod medications;
pub mod schema;
pub mod users;

pub use database::Database;
pub use error::StoreError;
