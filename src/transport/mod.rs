//! Transport seams between the router and the message bus.
//!
//! The router only talks to the bus through these traits: a
//! [`Connector`] opens the single [`Source`] subscription and the
//! [`Destination`] publish handles, inbound messages arrive as
//! [`Delivery`] values on a bounded channel, and connection health is
//! reported as [`TransportEvent`]s. [`nats`] implements them on top of
//! NATS JetStream.

pub mod nats;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::model::DestinationSpec;
use crate::config::settings::SourceSpec;
use crate::error::RouterError;

/// Capacity of the inbound buffer between the delivery pump and the
/// dispatch loop. One slot means the transport cannot hand over a second
/// message until the first one is resolved.
pub const INBOX_CAPACITY: usize = 1;

/// One inbound message, held by the dispatch loop until it is resolved.
// async_trait is required here because these traits are used as Box<dyn ...>
// and native async fn in traits does not support dyn dispatch.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn payload(&self) -> &Bytes;

    /// Transport-assigned sequence, when the transport exposes one.
    fn sequence(&self) -> Option<u64>;

    async fn ack(&self) -> Result<(), RouterError>;

    /// Tell the transport the message is still being worked on, so it is
    /// not redelivered while the dispatch loop holds it.
    async fn in_progress(&self) -> Result<(), RouterError>;
}

/// A live, ready-to-publish destination.
#[async_trait]
pub trait Destination: Send + Sync {
    fn subject(&self) -> &str;

    async fn publish(&self, payload: Bytes) -> Result<(), RouterError>;

    /// Best-effort teardown: every step runs, failures are collected.
    async fn close(&self) -> Result<(), RouterError>;
}

/// The live source subscription.
#[async_trait]
pub trait Source: Send + Sync {
    fn subject(&self) -> &str;

    /// Unsubscribe, close the session, close the connection. Every step
    /// runs even when an earlier one fails.
    async fn close(&self) -> Result<(), RouterError>;
}

/// A freshly opened source: the handle to close it and the inbound buffer.
pub struct Subscription<M> {
    pub source: Box<dyn Source>,
    pub inbox: mpsc::Receiver<M>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Message: Delivery + 'static;

    /// Connect, open a session and subscribe. On failure nothing stays open.
    async fn connect_source(
        &self,
        spec: &SourceSpec,
    ) -> Result<Subscription<Self::Message>, RouterError>;

    /// Connect and open a session for publishing. On failure nothing stays open.
    async fn connect_destination(
        &self,
        spec: &DestinationSpec,
    ) -> Result<Box<dyn Destination>, RouterError>;
}

/// Connection health changes reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected { target: String },
    Disconnected { target: String },
    Reconnected { target: String },
    /// The connection is gone for good; the router should shut down.
    Lost { target: String, reason: String },
    Notice { target: String, detail: String },
}
