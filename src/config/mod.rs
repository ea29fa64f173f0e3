//! Configuration: the destination list file and the router's own settings.
//!
//! The destination list is read once at startup by [`load_destinations`],
//! parsed according to the file extension and validated as a whole before
//! any connection is opened. Everything else comes from flags and
//! environment variables, see [`settings`].

pub mod duration;
pub mod model;
pub mod settings;
pub mod validation;

use std::path::Path;

use crate::error::RouterError;
use model::DestinationSpec;

/// TOML cannot hold a bare array at the top level, so TOML files wrap the
/// list in a `[[destinations]]` table array.
#[cfg(feature = "toml")]
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct DestinationTable {
    #[serde(default)]
    destinations: Vec<DestinationSpec>,
}

/// Parse a destination list based on file extension. Anything that is not
/// YAML or TOML is read as JSON.
pub fn parse_destinations_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Vec<DestinationSpec>, RouterError> {
    let parse_error = |source: Box<dyn std::error::Error + Send + Sync>| RouterError::ConfigParse {
        path: path_display.to_string(),
        source,
    };

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| parse_error(Box::new(e))),

        #[cfg(not(feature = "yaml"))]
        "yaml" | "yml" => Err(RouterError::UnsupportedFormat(format!(
            "{ext} (rebuild with the 'yaml' feature)"
        ))),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str::<DestinationTable>(content)
            .map(|table| table.destinations)
            .map_err(|e| parse_error(Box::new(e))),

        #[cfg(not(feature = "toml"))]
        "toml" => Err(RouterError::UnsupportedFormat(format!(
            "{ext} (rebuild with the 'toml' feature)"
        ))),

        _ => serde_json::from_str(content).map_err(|e| parse_error(Box::new(e))),
    }
}

/// Read, parse and validate the destination list.
pub async fn load_destinations(path: &Path) -> Result<Vec<DestinationSpec>, RouterError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RouterError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            RouterError::Io(e)
        }
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let destinations = parse_destinations_str(ext, &content, &path.display().to_string())?;

    if let Err(errors) = validation::validate(&destinations) {
        return Err(RouterError::ConfigValidation { errors });
    }

    tracing::debug!(
        path = %path.display(),
        destinations = destinations.len(),
        "destination list loaded"
    );
    Ok(destinations)
}
