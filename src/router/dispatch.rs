//! The dispatch loop.
//!
//! One message is in flight at a time. The loop waits `delay`, takes the
//! next message from the inbound buffer if none is held, classifies it,
//! publishes it to the matching destination (or to every destination when
//! nothing matches and broadcast is enabled) and acknowledges it only once
//! every required publish has succeeded. A message that could not be
//! delivered stays held and is retried after the error delay, so a stuck
//! destination pauses consumption instead of dropping traffic.
//!
//! Broadcast progress is kept per message: a destination that already
//! confirmed a broadcast is not published to again on retry.
//!
//! While a message is held, every retry tells the transport the message is
//! still in progress so its ack deadline does not expire. A redelivered
//! copy of a recently delivered sequence is acknowledged without being
//! published again.
//!
//! Shutdown is observed only while waiting (the delay and the buffer), so
//! an attempt that has started always runs to completion.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use super::classify::Classifier;
use super::registry::DestinationRegistry;
use crate::config::settings::DispatchPolicy;
use crate::error::RouterError;
use crate::transport::Delivery;

/// How many delivered sequences are remembered for duplicate detection.
const RECENT_SEQUENCES: usize = 64;

#[derive(Debug)]
pub struct DispatchStats {
    pub acknowledged: AtomicU64,
    pub retries: AtomicU64,
    pub broadcasts: AtomicU64,
    pub unclassified: AtomicU64,
    pub ack_failures: AtomicU64,
    pub duplicates: AtomicU64,
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            acknowledged: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            unclassified: AtomicU64::new(0),
            ack_failures: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub acknowledged: u64,
    pub retries: u64,
    pub broadcasts: u64,
    pub unclassified: u64,
    pub ack_failures: u64,
    pub duplicates: u64,
}

/// Result of one processing pass over the held message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered and acknowledged.
    Acknowledged,
    /// Delivered but the acknowledgement failed. The message is dropped
    /// locally and the transport redelivers it after its ack wait.
    Released,
    /// Not delivered; the message stays held for another attempt.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Delivered,
    Failed,
    /// Unmatched with broadcast disabled.
    Withheld,
}

struct Pending<M> {
    message: M,
    attempts: u32,
    confirmed: HashSet<usize>,
}

impl<M> Pending<M> {
    fn new(message: M) -> Self {
        Self {
            message,
            attempts: 0,
            confirmed: HashSet::new(),
        }
    }
}

pub struct DispatchLoop<M> {
    inbox: mpsc::Receiver<M>,
    registry: Arc<DestinationRegistry>,
    classifier: Classifier,
    policy: DispatchPolicy,
    pending: Option<Pending<M>>,
    delivered: VecDeque<u64>,
    delay: Duration,
    stats: Arc<DispatchStats>,
}

impl<M: Delivery> DispatchLoop<M> {
    #[must_use]
    pub fn new(
        inbox: mpsc::Receiver<M>,
        registry: Arc<DestinationRegistry>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            inbox,
            registry,
            classifier: Classifier::new(&policy.separator_name),
            delay: policy.delay,
            policy,
            pending: None,
            delivered: VecDeque::with_capacity(RECENT_SEQUENCES),
            stats: Arc::new(DispatchStats::new()),
        }
    }

    #[must_use]
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    /// Run until `shutdown` turns true (or its sender is dropped), or until
    /// the inbound buffer closes. The latter is reported as an error since
    /// the router cannot make progress without a source.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), RouterError> {
        tracing::debug!(
            separator = %self.policy.separator_name,
            broadcast = self.policy.broadcast_on_no_match,
            destinations = self.registry.len(),
            "dispatch loop started"
        );

        let result = 'run: loop {
            tokio::select! {
                biased;
                () = stopping(&mut shutdown) => break 'run Ok(()),
                () = tokio::time::sleep(self.delay) => {}
            }

            while self.pending.is_none() {
                let next = tokio::select! {
                    biased;
                    () = stopping(&mut shutdown) => break 'run Ok(()),
                    next = self.inbox.recv() => next,
                };
                match next {
                    Some(message) if self.was_delivered(&message) => {
                        self.settle_duplicate(message).await;
                    }
                    Some(message) => self.pending = Some(Pending::new(message)),
                    None => {
                        break 'run Err(RouterError::DispatchStopped(
                            "inbound buffer closed".into(),
                        ))
                    }
                }
            }

            self.process().await;
        };

        if let Some(pending) = self.pending.take() {
            tracing::info!(
                sequence = ?pending.message.sequence(),
                attempts = pending.attempts,
                "leaving held message unacknowledged for redelivery"
            );
        }
        tracing::debug!("dispatch loop stopped");
        result
    }

    async fn process(&mut self) -> Option<Outcome> {
        let pending = self.pending.as_mut()?;
        let attempt = deliver(
            &self.classifier,
            &self.registry,
            self.policy.broadcast_on_no_match,
            &self.stats,
            pending,
        )
        .await;

        if attempt != Attempt::Delivered {
            pending.attempts = pending.attempts.saturating_add(1);
            if let Err(e) = pending.message.in_progress().await {
                tracing::debug!(error = %e, "could not extend ack deadline");
            }
            let attempts = pending.attempts;
            let sequence = pending.message.sequence();
            let withheld = attempt == Attempt::Withheld;
            self.delay = self.policy.error_delay;
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                sequence = ?sequence,
                attempts,
                retry_in = ?self.delay,
                withheld,
                "message not delivered, holding for retry"
            );
            return Some(Outcome::Retry);
        }

        let pending = self.pending.take()?;
        self.delay = self.policy.delay;
        let sequence = pending.message.sequence();
        if let Some(seq) = sequence {
            if self.delivered.len() == RECENT_SEQUENCES {
                self.delivered.pop_front();
            }
            self.delivered.push_back(seq);
        }
        match pending.message.ack().await {
            Ok(()) => {
                self.stats.acknowledged.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(sequence = ?sequence, "message acknowledged");
                Some(Outcome::Acknowledged)
            }
            Err(e) => {
                self.stats.ack_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sequence = ?sequence,
                    error = %e,
                    "acknowledge failed, message will be redelivered"
                );
                Some(Outcome::Released)
            }
        }
    }
}

impl<M: Delivery> DispatchLoop<M> {
    fn was_delivered(&self, message: &M) -> bool {
        message
            .sequence()
            .is_some_and(|seq| self.delivered.contains(&seq))
    }

    /// Acknowledge a redelivered copy without publishing it again.
    async fn settle_duplicate(&self, message: M) {
        self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
        let sequence = message.sequence();
        match message.ack().await {
            Ok(()) => tracing::debug!(sequence = ?sequence, "redelivered copy acknowledged"),
            Err(e) => tracing::warn!(sequence = ?sequence, error = %e, "acknowledge of redelivered copy failed"),
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender counts as a
/// request.
async fn stopping(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop || shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn deliver<M: Delivery>(
    classifier: &Classifier,
    registry: &DestinationRegistry,
    broadcast: bool,
    stats: &DispatchStats,
    pending: &mut Pending<M>,
) -> Attempt {
    let payload = pending.message.payload().clone();

    match classifier.classify(&payload) {
        Ok(key) => {
            if let Some(destination) = registry.lookup(&key) {
                return match destination.publish(payload).await {
                    Ok(()) => {
                        tracing::debug!(separator = %key, subject = destination.subject(), "published");
                        Attempt::Delivered
                    }
                    Err(e) => {
                        tracing::error!(separator = %key, error = %e, "publish failed");
                        Attempt::Failed
                    }
                };
            }
            tracing::warn!(separator = %key, "no destination for separator value");
        }
        Err(e) => {
            stats.unclassified.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(field = classifier.field(), error = %e, "payload not classified");
        }
    }

    if !broadcast {
        return Attempt::Withheld;
    }
    if pending.confirmed.is_empty() {
        stats.broadcasts.fetch_add(1, Ordering::Relaxed);
    }
    broadcast_remaining(registry, &payload, &mut pending.confirmed).await
}

async fn broadcast_remaining(
    registry: &DestinationRegistry,
    payload: &Bytes,
    confirmed: &mut HashSet<usize>,
) -> Attempt {
    let mut complete = true;
    for (i, (separator, destination)) in registry.all().enumerate() {
        if confirmed.contains(&i) {
            continue;
        }
        match destination.publish(payload.clone()).await {
            Ok(()) => {
                confirmed.insert(i);
            }
            Err(e) => {
                complete = false;
                tracing::error!(separator, error = %e, "broadcast publish failed");
            }
        }
    }
    if complete {
        tracing::debug!(destinations = registry.len(), "broadcast complete");
        Attempt::Delivered
    } else {
        Attempt::Failed
    }
}
