//! End-to-end router runs against the in-memory transport.

mod common;

use std::time::Duration;

use tokio::sync::mpsc;

use common::{
    acked, closed, destination, policy, published, source_spec, typed, MockConnector,
    MockMessage, Recorder,
};
use relay_router::error::RouterError;
use relay_router::router::Router;
use relay_router::transport::TransportEvent;

fn shutdown_after(secs: u64) -> impl std::future::Future<Output = ()> + Send {
    tokio::time::sleep(Duration::from_secs(secs))
}

#[tokio::test(start_paused = true)]
async fn routes_until_shutdown_then_tears_down_in_order() {
    let recorder = Recorder::new();
    let (connector, tx) = MockConnector::new(&recorder);
    let (_events_tx, events_rx) = mpsc::unbounded_channel();

    tx.send(MockMessage::new(1, &typed("B"), &recorder))
        .await
        .unwrap();

    let router = Router::new(
        connector,
        source_spec(),
        vec![destination("A"), destination("B")],
        policy(true),
    );
    router.run(events_rx, shutdown_after(10)).await.unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            published("out.b"),
            acked(1),
            closed("out.a"),
            closed("out.b"),
            closed("source"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn destination_failure_aborts_startup_and_closes_source() {
    let recorder = Recorder::new();
    let (connector, _tx) = MockConnector::new(&recorder);
    let connector = connector.refusing("B");
    let (_events_tx, events_rx) = mpsc::unbounded_channel();

    let router = Router::new(
        connector,
        source_spec(),
        vec![destination("A"), destination("B")],
        policy(true),
    );
    let err = router.run(events_rx, shutdown_after(10)).await.unwrap_err();

    assert!(matches!(err, RouterError::Connect { .. }));
    assert_eq!(recorder.events(), vec![closed("out.a"), closed("source")]);
}

#[tokio::test(start_paused = true)]
async fn lost_connection_shuts_the_router_down_with_error() {
    let recorder = Recorder::new();
    let (connector, _tx) = MockConnector::new(&recorder);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    events_tx
        .send(TransportEvent::Disconnected {
            target: "nats://127.0.0.1:4222".into(),
        })
        .unwrap();
    events_tx
        .send(TransportEvent::Lost {
            target: "nats://127.0.0.1:4222".into(),
            reason: "max reconnects reached".into(),
        })
        .unwrap();

    let router = Router::new(connector, source_spec(), vec![destination("A")], policy(true));
    let err = router
        .run(events_rx, std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::ConnectionLost { .. }));
    assert_eq!(recorder.events(), vec![closed("out.a"), closed("source")]);
}

#[tokio::test(start_paused = true)]
async fn closed_inbox_stops_the_router_with_error() {
    let recorder = Recorder::new();
    let (connector, tx) = MockConnector::new(&recorder);
    let (_events_tx, events_rx) = mpsc::unbounded_channel();
    drop(tx);

    let router = Router::new(connector, source_spec(), vec![destination("A")], policy(true));
    let err = router
        .run(events_rx, std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, RouterError::DispatchStopped(_)));
    assert_eq!(recorder.events(), vec![closed("out.a"), closed("source")]);
}
