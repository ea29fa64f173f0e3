//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate), and their argument structs. Every `run`
//! flag has an environment variable equivalent; in container deployments
//! the router is configured through the environment alone.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::duration::parse_duration;
use crate::config::settings::Pings;

#[derive(Parser)]
#[command(
    name = "relay-router",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RELAY_ROUTER_GIT_SHORT"), ")"),
    about = "Content-based NATS message router",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        relay-router validate destinations.json   Check a destination list\n  \
        relay-router run                          Start with settings from the environment"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the router
    Run(Box<RunArgs>),

    /// Validate a destination list file without connecting
    Validate(ValidateArgs),
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s)
}

#[derive(Args, Debug)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        SRC_NATS_URL=nats://src:4222 STAN_CLIENT=router-1 SRC_SUB_SUBJECT=events \\\n  \
        SEPARATOR_NAME=type DST_FILE_LOC=destinations.json relay-router run\n  \
        relay-router run --pretty -l debug                 Local dev mode")]
pub struct RunArgs {
    // -- Source connection --
    /// Source NATS server URL
    #[arg(long, env = "SRC_NATS_URL", help_heading = "Source connection")]
    pub nats_url: String,

    /// Source NATS auth token
    #[arg(long, env = "SRC_NATS_TOKEN", help_heading = "Source connection")]
    pub nats_token: Option<String>,

    /// Interval between client pings
    #[arg(
        long,
        env = "SRC_NATS_PING_INTERVAL",
        default_value = "3s",
        value_parser = duration_arg,
        help_heading = "Source connection"
    )]
    pub nats_ping_interval: Duration,

    /// Unanswered pings before the connection is considered stale
    #[arg(
        long,
        env = "SRC_NATS_MAX_PINGS_OUTSTANDING",
        default_value_t = 20,
        help_heading = "Source connection"
    )]
    pub nats_max_pings_outstanding: u32,

    /// Wait between reconnect attempts
    #[arg(
        long,
        env = "SRC_NATS_RECONNECT_WAIT",
        default_value = "5s",
        value_parser = duration_arg,
        help_heading = "Source connection"
    )]
    pub nats_reconnect_wait: Duration,

    /// Reconnect attempts before giving up (0 or negative: forever)
    #[arg(
        long,
        env = "SRC_NATS_MAX_RECONNECTS",
        default_value_t = 20,
        allow_negative_numbers = true,
        help_heading = "Source connection"
    )]
    pub nats_max_reconnects: i64,

    /// Cluster id (JetStream domain) of the source
    #[arg(long, env = "SRC_STAN_CLUSTER", help_heading = "Source connection")]
    pub cluster_id: Option<String>,

    /// Timeout for establishing the source connection
    #[arg(
        long,
        env = "SRC_STAN_CONNECT_WAIT",
        default_value = "10s",
        value_parser = duration_arg,
        help_heading = "Source connection"
    )]
    pub connect_wait: Duration,

    /// Session heartbeat as '<interval secs>,<max outstanding>'
    #[arg(
        long,
        env = "SRC_STAN_PINGS",
        default_value = "3,20",
        help_heading = "Source connection"
    )]
    pub pings: Pings,

    /// Client id used for every connection this router opens
    #[arg(long, env = "STAN_CLIENT", help_heading = "Source connection")]
    pub client_id: String,

    // -- Subscription --
    /// Subject to consume
    #[arg(long, env = "SRC_SUB_SUBJECT", help_heading = "Subscription")]
    pub subject: String,

    /// Stream holding the subject (looked up by subject when unset)
    #[arg(long, env = "SRC_SUB_STREAM", help_heading = "Subscription")]
    pub stream: Option<String>,

    /// Queue group shared by router replicas
    #[arg(long, env = "SRC_SUB_GROUP", help_heading = "Subscription")]
    pub queue_group: Option<String>,

    /// Acknowledge explicitly after delivery (false: transport auto-acks)
    #[arg(
        long,
        env = "SRC_SUB_SET_MANUAL_ACK_MODE",
        default_value_t = true,
        action = ArgAction::Set,
        help_heading = "Subscription"
    )]
    pub manual_ack: bool,

    /// Unacknowledged messages the transport may have outstanding
    #[arg(
        long,
        env = "SRC_SUB_MAX_INFLIGHT",
        default_value_t = 1,
        help_heading = "Subscription"
    )]
    pub max_in_flight: u32,

    /// Time the transport waits for an ack before redelivering
    #[arg(
        long,
        env = "SRC_SUB_ACK_WAIT",
        default_value = "30s",
        value_parser = duration_arg,
        help_heading = "Subscription"
    )]
    pub ack_wait: Duration,

    /// Durable subscription name
    #[arg(long, env = "SRC_SUB_DURABLE_NAME", help_heading = "Subscription")]
    pub durable_name: Option<String>,

    /// Start at this UTC time (YYYY-MM-DDTHH:MM:SS)
    #[arg(long, env = "SRC_SUB_START_TIME", help_heading = "Subscription")]
    pub start_time: Option<String>,

    /// Start this far back in time
    #[arg(
        long,
        env = "SRC_SUB_START_AT_TIME_DELTA",
        value_parser = duration_arg,
        help_heading = "Subscription"
    )]
    pub start_at_time_delta: Option<Duration>,

    /// Start at this stream sequence
    #[arg(long, env = "SRC_SUB_START_AT_SEQUENCE", help_heading = "Subscription")]
    pub start_at_sequence: Option<u64>,

    /// Start with the last message received on the subject
    #[arg(
        long,
        env = "SRC_SUB_START_WITH_LAST_RECEIVED",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        help_heading = "Subscription"
    )]
    pub start_with_last_received: bool,

    // -- Routing --
    /// Payload field holding the classification key
    #[arg(long, env = "SEPARATOR_NAME", help_heading = "Routing")]
    pub separator_name: String,

    /// Broadcast to every destination when no destination matches
    #[arg(
        long,
        env = "SEND_TO_ALL",
        default_value_t = true,
        action = ArgAction::Set,
        help_heading = "Routing"
    )]
    pub send_to_all: bool,

    /// Delay between messages
    #[arg(
        long,
        env = "DELAY_LOOP",
        default_value = "3s",
        value_parser = duration_arg,
        help_heading = "Routing"
    )]
    pub delay_loop: Duration,

    /// Delay before retrying a failed delivery
    #[arg(
        long,
        env = "DELAY_IF_ERROR",
        default_value = "3s",
        value_parser = duration_arg,
        help_heading = "Routing"
    )]
    pub delay_if_error: Duration,

    /// Destination list file (.json; .yaml / .toml with features)
    #[arg(long, env = "DST_FILE_LOC", help_heading = "Routing")]
    pub destinations_file: PathBuf,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Destination list file to validate
    #[arg(default_value = "destinations.json")]
    pub file: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}
