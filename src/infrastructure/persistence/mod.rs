pub mod database;
pub mod notification_listener;
pub mod repositories;

pub use database::Database;
pub use notification_listener::PgChangeEventSource;
