//! Destination list validation with detailed error reporting.
//!
//! [`validate`] checks every entry of a parsed destination list and
//! collects all problems at once instead of stopping at the first one:
//! missing separator values, duplicates, empty subjects, transport URLs
//! with an unsupported scheme and malformed timing values.

use std::collections::HashSet;

use url::Url;

use super::duration::parse_duration;
use super::model::DestinationSpec;
use crate::error::ValidationError;

pub const TRANSPORT_SCHEMES: &[&str] = &["nats", "tls", "ws", "wss"];

/// Validate a transport URL. Returns `Ok(())` or a human-readable error.
pub fn validate_transport_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("transport URL cannot be empty".into());
    }
    match Url::parse(url) {
        Ok(parsed) if TRANSPORT_SCHEMES.contains(&parsed.scheme()) => Ok(()),
        Ok(parsed) => Err(format!(
            "unsupported scheme '{}' (expected one of: {})",
            parsed.scheme(),
            TRANSPORT_SCHEMES.join(", ")
        )),
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate a publish subject. NATS subjects are dot-separated tokens with
/// no whitespace; wildcards are not publishable.
pub fn validate_subject(subject: &str) -> Result<(), String> {
    if subject.is_empty() {
        return Err("publish subject cannot be empty".into());
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(format!("'{subject}' contains whitespace"));
    }
    if subject.split('.').any(|token| token.is_empty()) {
        return Err(format!("'{subject}' has an empty token"));
    }
    if subject.split('.').any(|token| token == "*" || token == ">") {
        return Err(format!("'{subject}' contains a wildcard"));
    }
    Ok(())
}

pub fn validate(destinations: &[DestinationSpec]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, spec) in destinations.iter().enumerate() {
        let id = if spec.separator_value.is_empty() {
            format!("destinations[{i}]")
        } else {
            format!("'{}'", spec.separator_value)
        };
        let reported = errors.len();
        let mut push = |field: &str, message: String, suggestion: Option<String>| {
            errors.push(ValidationError {
                destination: id.clone(),
                field: field.into(),
                message,
                suggestion,
            });
        };

        if spec.separator_value.is_empty() {
            push(
                "separator_value",
                "separator value cannot be empty".into(),
                None,
            );
        } else if !seen.insert(spec.separator_value.as_str()) {
            push(
                "separator_value",
                "duplicate separator value".into(),
                Some("each separator value may map to one destination only".into()),
            );
        }

        if let Err(msg) = validate_transport_url(&spec.transport_url) {
            let suggestion = (!spec.transport_url.is_empty() && !spec.transport_url.contains("://"))
                .then(|| format!("did you mean 'nats://{}'?", spec.transport_url));
            push("transport_url", msg, suggestion);
        }

        if let Err(msg) = validate_subject(&spec.publish_subject) {
            push("publish_subject", msg, None);
        }

        for (field, value) in [
            ("ping_interval", &spec.ping_interval),
            ("reconnect_wait", &spec.reconnect_wait),
            ("connect_wait", &spec.connect_wait),
        ] {
            if let Err(msg) = parse_duration(value) {
                push(field, msg, None);
            }
        }

        if spec.max_pings_outstanding < 1 {
            push(
                "max_pings_outstanding",
                format!("{} must be at least 1", spec.max_pings_outstanding),
                None,
            );
        }

        let [interval, max_outstanding] = spec.pings;
        if interval < 1 || max_outstanding < 1 {
            push(
                "pings",
                format!("[{interval}, {max_outstanding}] must both be at least 1"),
                Some("use [interval_seconds, max_outstanding], e.g. [3, 20]".into()),
            );
        }

        // Overflow on the u32 conversion is caught here too.
        if let Err(msg) = spec
            .network_options()
            .and_then(|_| spec.session_options("validate"))
        {
            if errors.len() == reported {
                errors.push(ValidationError {
                    destination: id.clone(),
                    field: "(entry)".into(),
                    message: msg,
                    suggestion: None,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, destinations: &[DestinationSpec]) -> String {
    let mut lines = vec![format!("  {} destinations\n", destinations.len())];

    for spec in destinations {
        lines.push(format!(
            "  {}  -> {} on {}",
            spec.separator_value, spec.publish_subject, spec.transport_url
        ));
        if let Some(ref cluster) = spec.cluster_id {
            lines.push(format!("    domain: {cluster}"));
        }
        lines.push(format!(
            "    reconnect: every {} (max {})",
            spec.reconnect_wait,
            if spec.max_reconnects > 0 {
                spec.max_reconnects.to_string()
            } else {
                "unlimited".into()
            }
        ));
    }

    if destinations.is_empty() {
        lines.push(
            "  warning: no destinations; with SEND_TO_ALL=true messages are acknowledged without being published, otherwise the first message is held until restart"
                .into(),
        );
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
