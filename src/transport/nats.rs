//! NATS JetStream implementation of the transport seams.
//!
//! Every connection is built in three steps: network connect, session
//! handshake (JetStream context, verified with an account query) and, for
//! the source, a push consumer. A failing step closes whatever the earlier
//! steps opened before the error is returned.
//!
//! The source consumer's messages are moved by a delivery pump task into
//! a channel of [`INBOX_CAPACITY`], so the dispatch loop pulls messages
//! instead of being called back on the client's task.

use std::sync::atomic::{AtomicBool, Ordering};

use async_nats::jetstream::{
    self,
    consumer::{push, AckPolicy, DeliverPolicy, PushConsumer},
    AckKind,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{
    Connector, Delivery, Destination, Source, Subscription, TransportEvent, INBOX_CAPACITY,
};
use crate::config::model::DestinationSpec;
use crate::config::settings::{
    NetworkOptions, SessionOptions, SourceSpec, StartPosition, SubscriptionOptions,
};
use crate::error::{ConnectStage, RouterError};

fn connect_error(
    target: &str,
    stage: ConnectStage,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> RouterError {
    RouterError::Connect {
        target: target.to_string(),
        stage,
        source: source.into(),
    }
}

/// Opens NATS connections and forwards their health events.
///
/// Every connection, source or destination, carries the router's client id
/// as its connection name.
pub struct NatsConnector {
    client_id: String,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl NatsConnector {
    #[must_use]
    pub fn new(client_id: &str, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            client_id: client_id.to_string(),
            events,
        }
    }

    async fn connect_network(
        &self,
        target: &str,
        network: &NetworkOptions,
        session: &SessionOptions,
    ) -> Result<async_nats::Client, RouterError> {
        let reconnect_wait = network.reconnect_wait;
        let events = self.events.clone();
        let label = target.to_string();
        let interrupted = AtomicBool::new(false);

        let mut options = async_nats::ConnectOptions::new()
            .name(&session.client_id)
            .ping_interval(network.ping_interval)
            .connection_timeout(session.connect_wait)
            .max_reconnects(network.max_reconnects)
            .reconnect_delay_callback(move |_attempts| reconnect_wait)
            .event_callback(move |event| {
                let events = events.clone();
                let translated = translate_event(&label, event, &interrupted);
                async move {
                    // receiver gone means shutdown is already under way
                    let _ = events.send(translated);
                }
            });
        if let Some(ref token) = network.token {
            options = options.token(token.clone());
        }

        options
            .connect(network.url.as_str())
            .await
            .map_err(|e| connect_error(target, ConnectStage::Network, e))
    }

    async fn open_session(
        target: &str,
        client: &async_nats::Client,
        session: &SessionOptions,
    ) -> Result<jetstream::Context, RouterError> {
        let context = match session.cluster_id {
            Some(ref domain) => jetstream::with_domain(client.clone(), domain),
            None => jetstream::new(client.clone()),
        };
        tokio::time::timeout(session.connect_wait, context.query_account())
            .await
            .map_err(|e| connect_error(target, ConnectStage::Session, e))?
            .map_err(|e| connect_error(target, ConnectStage::Session, e))?;
        Ok(context)
    }

    async fn subscribe(
        target: &str,
        client: &async_nats::Client,
        context: &jetstream::Context,
        session: &SessionOptions,
        sub: &SubscriptionOptions,
    ) -> Result<(jetstream::stream::Stream, PushConsumer), RouterError> {
        let stream_name = match sub.stream {
            Some(ref name) => name.clone(),
            None => context
                .stream_by_subject(sub.subject.clone())
                .await
                .map_err(|e| connect_error(target, ConnectStage::Subscribe, e))?,
        };
        let stream = context
            .get_stream(&stream_name)
            .await
            .map_err(|e| connect_error(target, ConnectStage::Subscribe, e))?;

        let config = push::Config {
            deliver_subject: client.new_inbox(),
            durable_name: sub.durable_name.clone(),
            deliver_group: sub.queue_group.clone(),
            filter_subject: sub.subject.clone(),
            ack_policy: if sub.manual_ack {
                AckPolicy::Explicit
            } else {
                AckPolicy::None
            },
            ack_wait: sub.ack_wait,
            max_ack_pending: sub.max_in_flight,
            deliver_policy: deliver_policy(sub.start, OffsetDateTime::now_utc()),
            idle_heartbeat: session.pings.interval(),
            ..Default::default()
        };

        let consumer: PushConsumer = match sub.durable_name {
            Some(ref durable) => stream
                .get_or_create_consumer(durable, config)
                .await
                .map_err(|e| connect_error(target, ConnectStage::Subscribe, e))?,
            None => stream
                .create_consumer(config)
                .await
                .map_err(|e| connect_error(target, ConnectStage::Subscribe, e))?,
        };

        Ok((stream, consumer))
    }
}

/// Map a start position onto a JetStream deliver policy.
pub(crate) fn deliver_policy(start: StartPosition, now: OffsetDateTime) -> DeliverPolicy {
    match start {
        StartPosition::Default => DeliverPolicy::New,
        StartPosition::AtTime(start_time) => DeliverPolicy::ByStartTime { start_time },
        StartPosition::AtTimeDelta(delta) => DeliverPolicy::ByStartTime {
            start_time: now - delta,
        },
        StartPosition::AtSequence(start_sequence) => {
            DeliverPolicy::ByStartSequence { start_sequence }
        }
        StartPosition::LastReceived => DeliverPolicy::Last,
    }
}

/// `interrupted` remembers a disconnect so the next `Connected` is reported
/// as a reconnect rather than the initial connect.
fn translate_event(
    target: &str,
    event: async_nats::Event,
    interrupted: &AtomicBool,
) -> TransportEvent {
    let target = target.to_string();
    match event {
        async_nats::Event::Disconnected => {
            interrupted.store(true, Ordering::Relaxed);
            TransportEvent::Disconnected { target }
        }
        async_nats::Event::Connected => {
            if interrupted.swap(false, Ordering::Relaxed) {
                TransportEvent::Reconnected { target }
            } else {
                TransportEvent::Connected { target }
            }
        }
        async_nats::Event::ClientError(async_nats::ClientError::MaxReconnects) => {
            TransportEvent::Lost {
                target,
                reason: "reconnect attempts exhausted".into(),
            }
        }
        other => TransportEvent::Notice {
            target,
            detail: format!("{other:?}"),
        },
    }
}

#[async_trait]
impl Connector for NatsConnector {
    type Message = NatsDelivery;

    async fn connect_source(
        &self,
        spec: &SourceSpec,
    ) -> Result<Subscription<NatsDelivery>, RouterError> {
        let target = format!("source {}", spec.subscription.subject);

        let client = self
            .connect_network(&target, &spec.network, &spec.session)
            .await?;

        let context = match Self::open_session(&target, &client, &spec.session).await {
            Ok(context) => context,
            Err(e) => {
                close_client(&client).await;
                return Err(e);
            }
        };

        let (stream, consumer) = match Self::subscribe(
            &target,
            &client,
            &context,
            &spec.session,
            &spec.subscription,
        )
        .await
        {
            Ok(subscribed) => subscribed,
            Err(e) => {
                close_client(&client).await;
                return Err(e);
            }
        };

        let messages = match consumer.messages().await {
            Ok(messages) => messages,
            Err(e) => {
                close_client(&client).await;
                return Err(connect_error(&target, ConnectStage::Subscribe, e));
            }
        };

        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let manual_ack = spec.subscription.manual_ack;
        let pump = tokio::spawn(pump_deliveries(messages, tx, manual_ack));

        let ephemeral_consumer = if spec.subscription.durable_name.is_none() {
            Some(consumer.cached_info().name.clone())
        } else {
            None
        };

        tracing::info!(
            url = %spec.network.url,
            subject = %spec.subscription.subject,
            stream = %stream.cached_info().config.name,
            durable = spec.subscription.durable_name.as_deref().unwrap_or(""),
            group = spec.subscription.queue_group.as_deref().unwrap_or(""),
            "source subscribed"
        );

        Ok(Subscription {
            source: Box::new(NatsSource {
                subject: spec.subscription.subject.clone(),
                client,
                stream,
                ephemeral_consumer,
                pump,
            }),
            inbox,
        })
    }

    async fn connect_destination(
        &self,
        spec: &DestinationSpec,
    ) -> Result<Box<dyn Destination>, RouterError> {
        let target = format!("destination {}", spec.separator_value);
        let network = spec
            .network_options()
            .map_err(|e| connect_error(&target, ConnectStage::Network, e))?;
        let session = self.session_for(spec, &target)?;

        let client = self.connect_network(&target, &network, &session).await?;
        let context = match Self::open_session(&target, &client, &session).await {
            Ok(context) => context,
            Err(e) => {
                close_client(&client).await;
                return Err(e);
            }
        };

        tracing::info!(
            separator = %spec.separator_value,
            url = %network.url,
            subject = %spec.publish_subject,
            "destination connected"
        );

        Ok(Box::new(NatsDestination {
            subject: spec.publish_subject.clone(),
            client,
            context,
        }))
    }
}

impl NatsConnector {
    fn session_for(
        &self,
        spec: &DestinationSpec,
        target: &str,
    ) -> Result<SessionOptions, RouterError> {
        spec.session_options(&self.client_id)
            .map_err(|e| connect_error(target, ConnectStage::Session, e))
    }
}

async fn close_client(client: &async_nats::Client) {
    if let Err(e) = client.flush().await {
        tracing::debug!(error = %e, "flush during teardown failed");
    }
}

async fn pump_deliveries(
    messages: push::Messages,
    tx: mpsc::Sender<NatsDelivery>,
    manual_ack: bool,
) {
    let mut messages = std::pin::pin!(messages);
    while let Some(next) = messages.next().await {
        match next {
            Ok(message) => {
                if tx.send(NatsDelivery::new(message, manual_ack)).await.is_err() {
                    tracing::debug!("inbound buffer closed, delivery pump stopping");
                    return;
                }
            }
            Err(e) => tracing::warn!(error = %e, "source delivery error"),
        }
    }
    tracing::warn!("source message stream ended");
}

pub struct NatsDelivery {
    inner: jetstream::Message,
    sequence: Option<u64>,
    manual_ack: bool,
}

impl NatsDelivery {
    fn new(inner: jetstream::Message, manual_ack: bool) -> Self {
        let sequence = inner.info().ok().map(|info| info.stream_sequence);
        Self {
            inner,
            sequence,
            manual_ack,
        }
    }
}

#[async_trait]
impl Delivery for NatsDelivery {
    fn payload(&self) -> &Bytes {
        &self.inner.message.payload
    }

    fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    async fn ack(&self) -> Result<(), RouterError> {
        if !self.manual_ack {
            return Ok(());
        }
        self.inner
            .ack()
            .await
            .map_err(|source| RouterError::Ack { source })
    }

    async fn in_progress(&self) -> Result<(), RouterError> {
        if !self.manual_ack {
            return Ok(());
        }
        self.inner
            .ack_with(AckKind::Progress)
            .await
            .map_err(|source| RouterError::Ack { source })
    }
}

pub struct NatsDestination {
    subject: String,
    client: async_nats::Client,
    context: jetstream::Context,
}

#[async_trait]
impl Destination for NatsDestination {
    fn subject(&self) -> &str {
        &self.subject
    }

    async fn publish(&self, payload: Bytes) -> Result<(), RouterError> {
        let publish_error = |e: Box<dyn std::error::Error + Send + Sync>| RouterError::Publish {
            subject: self.subject.clone(),
            source: e,
        };
        let ack = self
            .context
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| publish_error(Box::new(e)))?;
        ack.await.map_err(|e| publish_error(Box::new(e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), RouterError> {
        // The connection itself closes once the last client handle drops.
        self.client.flush().await.map_err(|e| RouterError::Close {
            target: format!("destination {}", self.subject),
            failures: vec![format!("flush session: {e}")],
        })
    }
}

pub struct NatsSource {
    subject: String,
    client: async_nats::Client,
    stream: jetstream::stream::Stream,
    ephemeral_consumer: Option<String>,
    pump: JoinHandle<()>,
}

#[async_trait]
impl Source for NatsSource {
    fn subject(&self) -> &str {
        &self.subject
    }

    async fn close(&self) -> Result<(), RouterError> {
        let mut failures = Vec::new();

        self.pump.abort();
        // Durable consumers keep their position for the next start.
        if let Some(ref name) = self.ephemeral_consumer {
            if let Err(e) = self.stream.delete_consumer(name).await {
                failures.push(format!("unsubscribe: {e}"));
            }
        }

        if let Err(e) = self.client.flush().await {
            failures.push(format!("flush session: {e}"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RouterError::Close {
                target: format!("source {}", self.subject),
                failures,
            })
        }
    }
}
