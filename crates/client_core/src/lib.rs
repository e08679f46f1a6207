//! Client-side transport for the gateway setup socket.
//!
//! [`ConnectionManager`] owns one logical WebSocket to the gateway and hides
//! reconnection behind a status stream; [`ProgressRouter`] multiplexes the
//! four long-running operations over it and folds their progress streams
//! into per-operation [`OperationState`]s.

pub mod config;
pub mod error;
pub mod manager;
pub mod progress;
pub mod router;

pub use config::TransportConfig;
pub use error::TransportError;
pub use manager::{ConnectionManager, ConnectionStatus};
pub use progress::{OperationState, OperationStatus, ProgressTracker};
pub use router::ProgressRouter;
