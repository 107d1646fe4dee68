#[cfg(any(target_arch = "wasm32", feature = "native"))]
pub mod connection;
pub mod connection_trait;
pub mod error;
#[cfg(target_arch = "wasm32")]
pub mod web_storage;

#[cfg(any(target_arch = "wasm32", feature = "native"))]
pub use connection::MatchboxConnection;
pub use connection_trait::{Connection, ConnectionEvent};
pub use error::{TransportError, TransportResult};
#[cfg(target_arch = "wasm32")]
pub use web_storage::BrowserSessionStore;
