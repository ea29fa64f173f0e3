//! relay-router is a content-based message router for NATS JetStream.
//!
//! It consumes one subject, reads a separator field out of each JSON
//! payload and republishes the message to the destination registered for
//! that value. Messages with no matching destination are broadcast to
//! every destination (or held, if broadcast is off). A message is
//! acknowledged only after every required publish succeeded; until then
//! it is retried and consumption pauses behind it.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line and environment parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate).
//! - [`config`] -- Destination list loading and validation, router settings.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`router`] -- Classification, the destination registry, the dispatch
//!   loop and the startup/shutdown sequence.
//! - [`transport`] -- The [`Connector`](transport::Connector) seam and its
//!   NATS JetStream implementation.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML destination lists |
//! | `toml` | TOML destination lists |
//! | `file-backends` | All destination list formats |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod logging;
pub mod router;
pub mod transport;
