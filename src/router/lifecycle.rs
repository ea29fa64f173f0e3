//! Startup and shutdown ordering.
//!
//! [`Router::run`] connects the source, builds the destination registry,
//! runs the dispatch loop and tears everything down in reverse once a
//! shutdown request arrives, the connection is lost for good or the loop
//! stops by itself. Teardown always runs in the same order: stop the loop,
//! close the destinations, close the source.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::dispatch::DispatchLoop;
use super::registry::DestinationRegistry;
use crate::config::model::DestinationSpec;
use crate::config::settings::{DispatchPolicy, SourceSpec};
use crate::error::RouterError;
use crate::transport::{Connector, Source, Subscription, TransportEvent};

pub struct Router<C> {
    connector: C,
    source: SourceSpec,
    destinations: Vec<DestinationSpec>,
    policy: DispatchPolicy,
}

impl<C: Connector> Router<C> {
    #[must_use]
    pub fn new(
        connector: C,
        source: SourceSpec,
        destinations: Vec<DestinationSpec>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            connector,
            source,
            destinations,
            policy,
        }
    }

    /// Run until `shutdown` resolves. Returns an error when startup fails,
    /// when the transport reports the connection lost, or when the dispatch
    /// loop ends on its own.
    pub async fn run<S>(
        self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: S,
    ) -> Result<(), RouterError>
    where
        S: Future<Output = ()> + Send,
    {
        let Subscription { source, inbox } = self.connector.connect_source(&self.source).await?;
        tracing::debug!(subject = source.subject(), "source ready");

        let registry =
            match DestinationRegistry::build(&self.destinations, &self.connector).await {
                Ok(registry) => Arc::new(registry),
                Err(e) => {
                    close_source(source.as_ref()).await;
                    return Err(e);
                }
            };
        if registry.is_empty() {
            tracing::warn!("{}", empty_registry_warning(self.policy.broadcast_on_no_match));
        }

        let dispatch = DispatchLoop::new(inbox, Arc::clone(&registry), self.policy.clone());
        let stats = dispatch.stats();
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut handle = tokio::spawn(dispatch.run(stop_rx));

        tracing::info!(
            destinations = registry.len(),
            separator = %self.policy.separator_name,
            broadcast = self.policy.broadcast_on_no_match,
            "router started"
        );

        tokio::pin!(shutdown);
        let mut loop_finished = false;
        let outcome = loop {
            tokio::select! {
                () = &mut shutdown => break Ok(()),
                joined = &mut handle => {
                    loop_finished = true;
                    break match joined {
                        Ok(Ok(())) => Err(RouterError::DispatchStopped("stopped without shutdown request".into())),
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(RouterError::DispatchStopped(e.to_string())),
                    };
                }
                Some(event) = events.recv() => {
                    if let Some(err) = on_event(event) {
                        break Err(err);
                    }
                }
            }
        };

        tracing::info!("shutting down");
        let _ = stop_tx.send(true);
        if !loop_finished {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "dispatch loop ended with error"),
                Err(e) => tracing::error!(error = %e, "dispatch task failed"),
            }
        }

        let failures = registry.close_all().await;
        if !failures.is_empty() {
            tracing::warn!(count = failures.len(), "some destinations did not close cleanly");
        }
        close_source(source.as_ref()).await;

        let totals = stats.snapshot();
        tracing::info!(
            acknowledged = totals.acknowledged,
            retries = totals.retries,
            broadcasts = totals.broadcasts,
            unclassified = totals.unclassified,
            ack_failures = totals.ack_failures,
            duplicates = totals.duplicates,
            "router stopped"
        );
        outcome
    }
}

pub(crate) fn empty_registry_warning(broadcast: bool) -> &'static str {
    if broadcast {
        "no destinations configured, every message is acknowledged without being published"
    } else {
        "no destinations configured and broadcast is off, the first message will be held until restart"
    }
}

fn on_event(event: TransportEvent) -> Option<RouterError> {
    match event {
        TransportEvent::Connected { target } => {
            tracing::info!(%target, "connected");
            None
        }
        TransportEvent::Disconnected { target } => {
            tracing::warn!(%target, "connection interrupted, reconnecting");
            None
        }
        TransportEvent::Reconnected { target } => {
            tracing::info!(%target, "connection restored");
            None
        }
        TransportEvent::Notice { target, detail } => {
            tracing::debug!(%target, %detail, "transport notice");
            None
        }
        TransportEvent::Lost { target, reason } => {
            tracing::error!(%target, %reason, "connection lost");
            Some(RouterError::ConnectionLost { target, reason })
        }
    }
}

async fn close_source(source: &dyn Source) {
    match source.close().await {
        Ok(()) => tracing::debug!(subject = source.subject(), "source closed"),
        Err(e) => tracing::error!(error = %e, "close source failed"),
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
