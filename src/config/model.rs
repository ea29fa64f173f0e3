//! Serde data structures for the destination list file.
//!
//! The file is an array of [`DestinationSpec`]. Every timing field has a
//! default, so a minimal entry only names its separator value, transport
//! URL and publish subject. The older `nats_*` / `stan_*` field names are
//! accepted as aliases.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration::parse_duration;
use super::settings::{NetworkOptions, Pings, SessionOptions};

fn default_ping_interval() -> String {
    "3s".to_string()
}

const fn default_max_pings_outstanding() -> i64 {
    20
}

fn default_reconnect_wait() -> String {
    "5s".to_string()
}

const fn default_max_reconnects() -> i64 {
    20
}

fn default_connect_wait() -> String {
    "10s".to_string()
}

const fn default_pings() -> [i64; 2] {
    [3, 20]
}

fn is_default_ping_interval(v: &str) -> bool {
    v == "3s"
}

fn is_default_reconnect_wait(v: &str) -> bool {
    v == "5s"
}

fn is_default_connect_wait(v: &str) -> bool {
    v == "10s"
}

fn is_default_max(v: &i64) -> bool {
    *v == 20
}

fn is_default_pings(v: &[i64; 2]) -> bool {
    *v == default_pings()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationSpec {
    pub separator_value: String,

    #[serde(alias = "nats_url")]
    pub transport_url: String,

    #[serde(default, alias = "nats_token", skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,

    #[serde(
        default = "default_ping_interval",
        alias = "nats_ping_interval",
        skip_serializing_if = "is_default_ping_interval"
    )]
    pub ping_interval: String,

    #[serde(
        default = "default_max_pings_outstanding",
        alias = "nats_max_pings_outstanding",
        skip_serializing_if = "is_default_max"
    )]
    pub max_pings_outstanding: i64,

    #[serde(
        default = "default_reconnect_wait",
        alias = "nats_reconnect_wait",
        skip_serializing_if = "is_default_reconnect_wait"
    )]
    pub reconnect_wait: String,

    #[serde(
        default = "default_max_reconnects",
        alias = "nats_max_reconnects",
        skip_serializing_if = "is_default_max"
    )]
    pub max_reconnects: i64,

    #[serde(default, alias = "stan_cluster", skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    #[serde(
        default = "default_connect_wait",
        alias = "stan_connect_wait",
        skip_serializing_if = "is_default_connect_wait"
    )]
    pub connect_wait: String,

    #[serde(
        default = "default_pings",
        alias = "stan_pings",
        skip_serializing_if = "is_default_pings"
    )]
    pub pings: [i64; 2],

    #[serde(alias = "stan_subject")]
    pub publish_subject: String,
}

impl DestinationSpec {
    /// Spec with every optional field at its default.
    #[must_use]
    pub fn new(separator_value: &str, transport_url: &str, publish_subject: &str) -> Self {
        Self {
            separator_value: separator_value.to_string(),
            transport_url: transport_url.to_string(),
            credentials: None,
            ping_interval: default_ping_interval(),
            max_pings_outstanding: default_max_pings_outstanding(),
            reconnect_wait: default_reconnect_wait(),
            max_reconnects: default_max_reconnects(),
            cluster_id: None,
            connect_wait: default_connect_wait(),
            pings: default_pings(),
            publish_subject: publish_subject.to_string(),
        }
    }

    /// Network-level options, parsing the duration strings.
    pub fn network_options(&self) -> Result<NetworkOptions, String> {
        Ok(NetworkOptions {
            url: self.transport_url.clone(),
            token: self.credentials.clone().filter(|t| !t.is_empty()),
            ping_interval: parse_field("ping_interval", &self.ping_interval)?,
            max_pings_outstanding: count("max_pings_outstanding", self.max_pings_outstanding)?,
            reconnect_wait: parse_field("reconnect_wait", &self.reconnect_wait)?,
            max_reconnects: reconnect_limit(self.max_reconnects),
        })
    }

    /// Session-level options; destinations share the router's client id.
    pub fn session_options(&self, client_id: &str) -> Result<SessionOptions, String> {
        let [interval, max_outstanding] = self.pings;
        Ok(SessionOptions {
            cluster_id: self.cluster_id.clone().filter(|c| !c.is_empty()),
            client_id: client_id.to_string(),
            connect_wait: parse_field("connect_wait", &self.connect_wait)?,
            pings: Pings::new(
                count("pings[0]", interval)?,
                count("pings[1]", max_outstanding)?,
            )?,
        })
    }
}

fn parse_field(field: &str, value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| format!("{field}: {e}"))
}

fn count(field: &str, value: i64) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("{field}: {value} is out of range"))
}

/// Non-positive limits mean "reconnect forever".
fn reconnect_limit(value: i64) -> Option<usize> {
    usize::try_from(value).ok().filter(|n| *n > 0)
}
