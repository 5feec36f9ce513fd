pub mod connection;

pub use connection::{ConnectionManager, ConnectionState, RECONNECT_DELAY};
