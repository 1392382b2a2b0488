pub mod bridge;
pub mod connection;
pub mod gateway;
pub mod heartbeat;
pub mod registry;

pub use connection::{ConnState, ConnectionHandle};
pub use gateway::{CollabGateway, ConnectError};
pub use registry::ConnectionRegistry;
