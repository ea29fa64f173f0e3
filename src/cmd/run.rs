//! `relay-router run`: start routing.
//!
//! Resolves settings from flags and environment, loads the destination
//! list, then hands over to [`Router`] until SIGTERM / Ctrl+C or a lost
//! connection.

use tokio::sync::mpsc;

use crate::cli::RunArgs;
use crate::config::{self, settings::RouterSettings};
use crate::error::RouterError;
use crate::logging;
use crate::router::{shutdown_signal, Router};
use crate::transport::nats::NatsConnector;

pub async fn execute(args: RunArgs) -> Result<(), RouterError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let settings = RouterSettings::from_args(&args)?;
    let destinations = config::load_destinations(&settings.destinations_file).await?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("RELAY_ROUTER_GIT_SHORT"),
        client_id = %settings.client_id,
        source = %settings.source.network.url,
        subject = %settings.source.subscription.subject,
        destinations = destinations.len(),
        "relay-router starting"
    );

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let connector = NatsConnector::new(&settings.client_id, events_tx);

    Router::new(connector, settings.source, destinations, settings.policy)
        .run(events_rx, shutdown_signal())
        .await
}
