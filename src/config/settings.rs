//! Runtime settings resolved from the environment / command line.
//!
//! [`RouterSettings::from_args`] turns the raw [`RunArgs`] into typed
//! connection, subscription and dispatch options, rejecting invalid
//! combinations before any connection is attempted.

use std::str::FromStr;
use std::time::Duration;

use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::cli::RunArgs;
use crate::error::RouterError;

/// Transport connection parameters shared by the source and destinations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOptions {
    pub url: String,
    pub token: Option<String>,
    pub ping_interval: Duration,
    /// Validated only; the NATS client has no setting for it.
    pub max_pings_outstanding: u32,
    pub reconnect_wait: Duration,
    /// `None` reconnects forever.
    pub max_reconnects: Option<usize>,
}

/// Session (streaming layer) parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub cluster_id: Option<String>,
    pub client_id: String,
    pub connect_wait: Duration,
    pub pings: Pings,
}

/// Session heartbeat: interval in seconds and tolerated misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pings {
    pub interval_secs: u32,
    /// Validated only; the NATS client has no setting for it.
    pub max_outstanding: u32,
}

impl Pings {
    pub fn new(interval_secs: u32, max_outstanding: u32) -> Result<Self, String> {
        if interval_secs == 0 || max_outstanding == 0 {
            return Err(format!(
                "pings must be positive, got [{interval_secs},{max_outstanding}]"
            ));
        }
        Ok(Self {
            interval_secs,
            max_outstanding,
        })
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_secs))
    }
}

impl Default for Pings {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            max_outstanding: 20,
        }
    }
}

impl FromStr for Pings {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [interval, max] = parts.as_slice() else {
            return Err(format!("expected '<interval>,<max>', got '{s}'"));
        };
        let interval = interval
            .parse::<u32>()
            .map_err(|e| format!("ping interval '{interval}': {e}"))?;
        let max = max
            .parse::<u32>()
            .map_err(|e| format!("max outstanding pings '{max}': {e}"))?;
        Self::new(interval, max)
    }
}

/// Where a new subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Transport default: only messages published from now on, or the
    /// stored position of an existing durable.
    Default,
    AtTime(OffsetDateTime),
    AtTimeDelta(Duration),
    AtSequence(u64),
    LastReceived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub subject: String,
    pub stream: Option<String>,
    pub queue_group: Option<String>,
    pub manual_ack: bool,
    pub max_in_flight: i64,
    pub ack_wait: Duration,
    pub durable_name: Option<String>,
    pub start: StartPosition,
}

/// Everything needed to open the single source subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub network: NetworkOptions,
    pub session: SessionOptions,
    pub subscription: SubscriptionOptions,
}

/// Classification and retry policy of the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub separator_name: String,
    pub broadcast_on_no_match: bool,
    pub delay: Duration,
    pub error_delay: Duration,
}

impl DispatchPolicy {
    #[must_use]
    pub fn new(separator_name: &str) -> Self {
        Self {
            separator_name: separator_name.to_string(),
            broadcast_on_no_match: true,
            delay: Duration::from_secs(3),
            error_delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub source: SourceSpec,
    pub policy: DispatchPolicy,
    pub client_id: String,
    pub destinations_file: std::path::PathBuf,
}

/// Parse `YYYY-MM-DDTHH:MM:SS`, interpreted as UTC.
pub fn parse_start_time(s: &str) -> Result<OffsetDateTime, String> {
    let layout = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(s, layout)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| format!("'{s}' is not YYYY-MM-DDTHH:MM:SS: {e}"))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

fn required(name: &'static str, value: &str) -> Result<String, RouterError> {
    if value.trim().is_empty() {
        return Err(RouterError::InvalidSetting {
            name,
            message: "must be set".into(),
        });
    }
    Ok(value.to_string())
}

impl RouterSettings {
    pub fn from_args(args: &RunArgs) -> Result<Self, RouterError> {
        let client_id = required("STAN_CLIENT", &args.client_id)?;

        let mut starts = Vec::new();
        if let Some(raw) = args.start_time.as_deref().filter(|s| !s.is_empty()) {
            let at = parse_start_time(raw).map_err(|message| RouterError::InvalidSetting {
                name: "SRC_SUB_START_TIME",
                message,
            })?;
            starts.push(StartPosition::AtTime(at));
        }
        if let Some(delta) = args.start_at_time_delta.filter(|d| !d.is_zero()) {
            starts.push(StartPosition::AtTimeDelta(delta));
        }
        if let Some(seq) = args.start_at_sequence.filter(|s| *s > 0) {
            starts.push(StartPosition::AtSequence(seq));
        }
        if args.start_with_last_received {
            starts.push(StartPosition::LastReceived);
        }
        let start = match starts.as_slice() {
            [] => StartPosition::Default,
            [only] => *only,
            _ => {
                return Err(RouterError::InvalidSetting {
                    name: "SRC_SUB_START_*",
                    message: format!("at most one start position may be set, got {starts:?}"),
                })
            }
        };

        let max_in_flight = i64::from(args.max_in_flight);
        if max_in_flight == 0 {
            return Err(RouterError::InvalidSetting {
                name: "SRC_SUB_MAX_INFLIGHT",
                message: "must be at least 1".into(),
            });
        }

        let source = SourceSpec {
            network: NetworkOptions {
                url: required("SRC_NATS_URL", &args.nats_url)?,
                token: non_empty(args.nats_token.as_ref()),
                ping_interval: args.nats_ping_interval,
                max_pings_outstanding: args.nats_max_pings_outstanding,
                reconnect_wait: args.nats_reconnect_wait,
                max_reconnects: usize::try_from(args.nats_max_reconnects)
                    .ok()
                    .filter(|n| *n > 0),
            },
            session: SessionOptions {
                cluster_id: non_empty(args.cluster_id.as_ref()),
                client_id: client_id.clone(),
                connect_wait: args.connect_wait,
                pings: args.pings,
            },
            subscription: SubscriptionOptions {
                subject: required("SRC_SUB_SUBJECT", &args.subject)?,
                stream: non_empty(args.stream.as_ref()),
                queue_group: non_empty(args.queue_group.as_ref()),
                manual_ack: args.manual_ack,
                max_in_flight,
                ack_wait: args.ack_wait,
                durable_name: non_empty(args.durable_name.as_ref()),
                start,
            },
        };

        if args.delay_if_error.is_zero() {
            return Err(RouterError::InvalidSetting {
                name: "DELAY_IF_ERROR",
                message: "must be greater than zero".into(),
            });
        }

        let policy = DispatchPolicy {
            separator_name: required("SEPARATOR_NAME", &args.separator_name)?,
            broadcast_on_no_match: args.send_to_all,
            delay: args.delay_loop,
            error_delay: args.delay_if_error,
        };

        Ok(Self {
            source,
            policy,
            client_id,
            destinations_file: args.destinations_file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Commands};

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec![
            "relay-router",
            "run",
            "--nats-url",
            "nats://src:4222",
            "--client-id",
            "router-1",
            "--subject",
            "events.in",
            "--separator-name",
            "type",
            "--destinations-file",
            "dst.json",
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Some(Commands::Run(args)) => *args,
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = RouterSettings::from_args(&run_args(&[])).unwrap();
        assert_eq!(settings.policy, DispatchPolicy::new("type"));
        let source = &settings.source;
        assert_eq!(source.network.ping_interval, Duration::from_secs(3));
        assert_eq!(source.network.reconnect_wait, Duration::from_secs(5));
        assert_eq!(source.network.max_reconnects, Some(20));
        assert_eq!(source.session.connect_wait, Duration::from_secs(10));
        assert_eq!(source.session.pings, Pings::default());
        assert!(source.subscription.manual_ack);
        assert_eq!(source.subscription.max_in_flight, 1);
        assert_eq!(source.subscription.start, StartPosition::Default);
    }

    #[test]
    fn start_time_is_parsed_as_utc() {
        let settings =
            RouterSettings::from_args(&run_args(&["--start-time", "2024-03-01T12:30:00"]))
                .unwrap();
        let StartPosition::AtTime(at) = settings.source.subscription.start else {
            panic!("expected start time");
        };
        assert_eq!(at.unix_timestamp(), 1_709_296_200);
    }

    #[test]
    fn invalid_start_time_is_rejected() {
        let err =
            RouterSettings::from_args(&run_args(&["--start-time", "01/03/2024"])).unwrap_err();
        assert!(matches!(
            err,
            RouterError::InvalidSetting {
                name: "SRC_SUB_START_TIME",
                ..
            }
        ));
    }

    #[test]
    fn conflicting_start_positions_are_rejected() {
        let err = RouterSettings::from_args(&run_args(&[
            "--start-at-sequence",
            "42",
            "--start-with-last-received",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("at most one start position"));
    }

    #[test]
    fn empty_required_value_is_rejected() {
        let err = RouterSettings::from_args(&run_args(&["--separator-name", ""])).unwrap_err();
        assert!(matches!(
            err,
            RouterError::InvalidSetting {
                name: "SEPARATOR_NAME",
                ..
            }
        ));
    }

    #[test]
    fn zero_error_delay_is_rejected() {
        let err = RouterSettings::from_args(&run_args(&["--delay-if-error", "0s"])).unwrap_err();
        assert!(matches!(
            err,
            RouterError::InvalidSetting {
                name: "DELAY_IF_ERROR",
                ..
            }
        ));
        assert!(RouterSettings::from_args(&run_args(&["--delay-loop", "0s"])).is_ok());
    }

    #[test]
    fn pings_parse_from_pair() {
        assert_eq!("3,20".parse::<Pings>().unwrap(), Pings::default());
        assert_eq!(" 5 , 7 ".parse::<Pings>().unwrap(), Pings::new(5, 7).unwrap());
        assert!("3".parse::<Pings>().is_err());
        assert!("0,20".parse::<Pings>().is_err());
    }
}
