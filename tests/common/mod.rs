//! In-memory transport used by the integration tests.
//!
//! Every publish, acknowledgement and close is appended to a shared
//! [`Recorder`] together with the (paused) tokio clock, so tests can assert
//! on ordering and on the retry cadence.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use relay_router::config::model::DestinationSpec;
use relay_router::config::settings::{
    DispatchPolicy, NetworkOptions, Pings, SessionOptions, SourceSpec, StartPosition,
    SubscriptionOptions,
};
use relay_router::error::{ConnectStage, RouterError};
use relay_router::transport::{
    Connector, Delivery, Destination, Source, Subscription, INBOX_CAPACITY,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Published { subject: String },
    PublishFailed { subject: String },
    Acked { sequence: u64 },
    Closed { target: String },
}

pub fn published(subject: &str) -> Event {
    Event::Published {
        subject: subject.into(),
    }
}

pub fn failed(subject: &str) -> Event {
    Event::PublishFailed {
        subject: subject.into(),
    }
}

pub fn acked(sequence: u64) -> Event {
    Event::Acked { sequence }
}

pub fn closed(target: &str) -> Event {
    Event::Closed {
        target: target.into(),
    }
}

#[derive(Clone)]
pub struct Recorder {
    start: Instant,
    log: Arc<Mutex<Vec<(Duration, Event)>>>,
    progress: Arc<Mutex<Vec<u64>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            log: Arc::new(Mutex::new(Vec::new())),
            progress: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, event: Event) {
        let at = self.start.elapsed();
        self.log.lock().unwrap().push((at, event));
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    /// How often `sequence` was reported as still in progress.
    pub fn progress_reports(&self, sequence: u64) -> usize {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == sequence)
            .count()
    }

    /// Events with the whole second at which they happened.
    pub fn timeline(&self) -> Vec<(u64, Event)> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(at, e)| (at.as_secs(), e.clone()))
            .collect()
    }
}

pub struct MockMessage {
    sequence: u64,
    payload: Bytes,
    recorder: Recorder,
    fail_ack: bool,
}

impl MockMessage {
    pub fn new(sequence: u64, payload: &str, recorder: &Recorder) -> Self {
        Self {
            sequence,
            payload: Bytes::from(payload.to_string()),
            recorder: recorder.clone(),
            fail_ack: false,
        }
    }

    pub fn failing_ack(mut self) -> Self {
        self.fail_ack = true;
        self
    }
}

#[async_trait]
impl Delivery for MockMessage {
    fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn sequence(&self) -> Option<u64> {
        Some(self.sequence)
    }

    async fn ack(&self) -> Result<(), RouterError> {
        if self.fail_ack {
            return Err(RouterError::Ack {
                source: "ack timed out".into(),
            });
        }
        self.recorder.record(acked(self.sequence));
        Ok(())
    }

    async fn in_progress(&self) -> Result<(), RouterError> {
        self.recorder.progress.lock().unwrap().push(self.sequence);
        Ok(())
    }
}

pub struct MockDestination {
    subject: String,
    failures_left: AtomicUsize,
    fail_close: bool,
    recorder: Recorder,
}

impl MockDestination {
    /// A destination whose first `failures` publishes fail.
    pub fn new(subject: &str, failures: usize, recorder: &Recorder) -> Self {
        Self {
            subject: subject.into(),
            failures_left: AtomicUsize::new(failures),
            fail_close: false,
            recorder: recorder.clone(),
        }
    }
}

#[async_trait]
impl Destination for MockDestination {
    fn subject(&self) -> &str {
        &self.subject
    }

    async fn publish(&self, _payload: Bytes) -> Result<(), RouterError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            self.recorder.record(failed(&self.subject));
            return Err(RouterError::Publish {
                subject: self.subject.clone(),
                source: "no responders available for request".into(),
            });
        }
        self.recorder.record(published(&self.subject));
        Ok(())
    }

    async fn close(&self) -> Result<(), RouterError> {
        self.recorder.record(closed(&self.subject));
        if self.fail_close {
            return Err(RouterError::Close {
                target: self.subject.clone(),
                failures: vec!["flush: connection closed".into()],
            });
        }
        Ok(())
    }
}

pub struct MockSource {
    recorder: Recorder,
}

#[async_trait]
impl Source for MockSource {
    fn subject(&self) -> &str {
        "events.in"
    }

    async fn close(&self) -> Result<(), RouterError> {
        self.recorder.record(closed("source"));
        Ok(())
    }
}

pub struct MockConnector {
    recorder: Recorder,
    inbox: Mutex<Option<mpsc::Receiver<MockMessage>>>,
    publish_failures: HashMap<String, usize>,
    refused: Option<String>,
    failing_close: Option<String>,
    pub destination_connects: AtomicUsize,
}

impl MockConnector {
    /// Returns the connector and the sending side of the inbound buffer.
    pub fn new(recorder: &Recorder) -> (Self, mpsc::Sender<MockMessage>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let connector = Self {
            recorder: recorder.clone(),
            inbox: Mutex::new(Some(rx)),
            publish_failures: HashMap::new(),
            refused: None,
            failing_close: None,
            destination_connects: AtomicUsize::new(0),
        };
        (connector, tx)
    }

    pub fn failing_publishes(mut self, separator: &str, count: usize) -> Self {
        self.publish_failures.insert(separator.into(), count);
        self
    }

    pub fn refusing(mut self, separator: &str) -> Self {
        self.refused = Some(separator.into());
        self
    }

    pub fn failing_close(mut self, separator: &str) -> Self {
        self.failing_close = Some(separator.into());
        self
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Message = MockMessage;

    async fn connect_source(
        &self,
        spec: &SourceSpec,
    ) -> Result<Subscription<MockMessage>, RouterError> {
        let inbox = self.inbox.lock().unwrap().take().ok_or_else(|| {
            RouterError::Connect {
                target: spec.network.url.clone(),
                stage: ConnectStage::Subscribe,
                source: "already subscribed".into(),
            }
        })?;
        Ok(Subscription {
            source: Box::new(MockSource {
                recorder: self.recorder.clone(),
            }),
            inbox,
        })
    }

    async fn connect_destination(
        &self,
        spec: &DestinationSpec,
    ) -> Result<Box<dyn Destination>, RouterError> {
        self.destination_connects.fetch_add(1, Ordering::SeqCst);
        if self.refused.as_deref() == Some(spec.separator_value.as_str()) {
            return Err(RouterError::Connect {
                target: spec.transport_url.clone(),
                stage: ConnectStage::Network,
                source: "connection refused".into(),
            });
        }
        let failures = self
            .publish_failures
            .get(&spec.separator_value)
            .copied()
            .unwrap_or(0);
        let mut destination = MockDestination::new(&spec.publish_subject, failures, &self.recorder);
        destination.fail_close = self.failing_close.as_deref() == Some(spec.separator_value.as_str());
        Ok(Box::new(destination))
    }
}

/// `separator → out.<lowercase separator>` on a local server.
pub fn destination(separator: &str) -> DestinationSpec {
    DestinationSpec::new(
        separator,
        "nats://127.0.0.1:4222",
        &format!("out.{}", separator.to_lowercase()),
    )
}

pub fn source_spec() -> SourceSpec {
    SourceSpec {
        network: NetworkOptions {
            url: "nats://127.0.0.1:4222".into(),
            token: None,
            ping_interval: Duration::from_secs(3),
            max_pings_outstanding: 20,
            reconnect_wait: Duration::from_secs(5),
            max_reconnects: Some(20),
        },
        session: SessionOptions {
            cluster_id: None,
            client_id: "router-test".into(),
            connect_wait: Duration::from_secs(10),
            pings: Pings::default(),
        },
        subscription: SubscriptionOptions {
            subject: "events.in".into(),
            stream: None,
            queue_group: None,
            manual_ack: true,
            max_in_flight: 1,
            ack_wait: Duration::from_secs(30),
            durable_name: None,
            start: StartPosition::Default,
        },
    }
}

/// Classify on `type`, 3s nominal delay, 1s error delay.
pub fn policy(broadcast: bool) -> DispatchPolicy {
    let mut policy = DispatchPolicy::new("type");
    policy.broadcast_on_no_match = broadcast;
    policy.delay = Duration::from_secs(3);
    policy.error_delay = Duration::from_secs(1);
    policy
}

pub fn typed(kind: &str) -> String {
    format!(r#"{{"type":"{kind}","body":"x"}}"#)
}
