//! Content-based routing: classification, the destination table, the
//! dispatch loop and the startup/shutdown sequence around them.

pub mod classify;
pub mod dispatch;
pub mod lifecycle;
pub mod registry;

pub use classify::Classifier;
pub use dispatch::{DispatchLoop, DispatchStats, Outcome, StatsSnapshot};
pub use lifecycle::{shutdown_signal, Router};
pub use registry::DestinationRegistry;
