//! Integration tests for destination list loading across file formats.

use std::path::{Path, PathBuf};

use relay_router::config::model::DestinationSpec;
use relay_router::config::validation::validate;
use relay_router::config::{load_destinations, parse_destinations_str};
use relay_router::error::RouterError;

fn load_example(name: &str) -> String {
    let path = format!("example/{name}");
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read {path}: {e}"))
}

fn scratch_file(name: &str, content: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("relay-router-tests-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn check_example(list: &[DestinationSpec]) {
    validate(list).unwrap();
    let separators: Vec<&str> = list.iter().map(|d| d.separator_value.as_str()).collect();
    assert_eq!(separators, ["order", "invoice", "audit"]);

    let invoice = list[1].network_options().unwrap();
    assert_eq!(invoice.max_reconnects, None);
    assert_eq!(invoice.token.as_deref(), Some("billing-token"));

    let audit = &list[2];
    assert_eq!(audit.cluster_id.as_deref(), Some("audit-hub"));
    assert_eq!(audit.publish_subject, "audit.events");
    assert_eq!(audit.session_options("router-1").unwrap().pings.interval_secs, 5);
}

#[test]
fn json_example_loads_and_validates() {
    let content = load_example("destinations.json");
    let list = parse_destinations_str("json", &content, "destinations.json").unwrap();
    check_example(&list);
}

#[cfg(feature = "yaml")]
#[test]
fn yaml_example_loads_and_validates() {
    let content = load_example("destinations.yaml");
    let list = parse_destinations_str("yaml", &content, "destinations.yaml").unwrap();
    check_example(&list);
}

#[cfg(feature = "toml")]
#[test]
fn toml_example_loads_and_validates() {
    let content = load_example("destinations.toml");
    let list = parse_destinations_str("toml", &content, "destinations.toml").unwrap();
    check_example(&list);
}

#[cfg(all(feature = "yaml", feature = "toml"))]
#[test]
fn all_formats_produce_equivalent_lists() {
    let json = parse_destinations_str("json", &load_example("destinations.json"), "json").unwrap();
    let yaml = parse_destinations_str("yaml", &load_example("destinations.yaml"), "yaml").unwrap();
    let toml = parse_destinations_str("toml", &load_example("destinations.toml"), "toml").unwrap();
    assert_eq!(json, yaml);
    assert_eq!(json, toml);
}

#[tokio::test]
async fn load_reads_and_validates_the_file() {
    let list = load_destinations(Path::new("example/destinations.json"))
        .await
        .unwrap();
    assert_eq!(list.len(), 3);
}

#[tokio::test]
async fn load_rejects_invalid_entries_before_connecting() {
    let path = scratch_file(
        "invalid.json",
        r#"[
            {"separator_value":"A","transport_url":"http://a:4222","publish_subject":"out.a"},
            {"separator_value":"A","transport_url":"nats://a:4222","publish_subject":""}
        ]"#,
    );

    let err = load_destinations(&path).await.unwrap_err();

    let RouterError::ConfigValidation { errors } = err else {
        panic!("expected validation error, got {err}");
    };
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, ["transport_url", "separator_value", "publish_subject"]);
}

#[tokio::test]
async fn load_accepts_empty_list() {
    let path = scratch_file("empty.json", "[]");
    assert!(load_destinations(&path).await.unwrap().is_empty());
}

#[tokio::test]
async fn load_rejects_unknown_fields() {
    let path = scratch_file(
        "unknown.json",
        r#"[{"separator_value":"A","transport_url":"nats://a:4222","publish_subject":"out.a","priority":1}]"#,
    );
    let err = load_destinations(&path).await.unwrap_err();
    assert!(matches!(err, RouterError::ConfigParse { .. }));
}
