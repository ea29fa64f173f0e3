//! `relay-router validate`: check a destination list for errors.
//!
//! Parses and validates the file without connecting to anything, reporting
//! results in either human-readable text or machine-readable JSON format.

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::{parse_destinations_str, validation};
use crate::error::RouterError;

pub fn execute(args: &ValidateArgs) -> Result<(), RouterError> {
    let path = &args.file;

    if !path.exists() {
        return Err(RouterError::ConfigFileNotFound { path: path.clone() });
    }

    let content = std::fs::read_to_string(path)?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let destinations = parse_destinations_str(ext, &content, &path.display().to_string())?;

    if let Err(errors) = validation::validate(&destinations) {
        match args.format {
            ValidateFormat::Text => {
                eprintln!("\u{2717} {} has {} errors\n", path.display(), errors.len());
                for error in &errors {
                    eprintln!("{error}");
                }
            }
            ValidateFormat::Json => {
                let json_errors: Vec<serde_json::Value> = errors
                    .iter()
                    .map(|e| {
                        serde_json::json!({
                            "destination": e.destination,
                            "field": e.field,
                            "message": e.message,
                            "suggestion": e.suggestion,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "valid": false,
                        "errors": json_errors,
                    })
                );
            }
        }
        return Err(RouterError::ConfigValidation { errors });
    }

    match args.format {
        ValidateFormat::Text => {
            println!(
                "\u{2713} {}",
                validation::format_validation_report(&path.display().to_string(), &destinations)
            );
        }
        ValidateFormat::Json => {
            let separators: Vec<&str> = destinations
                .iter()
                .map(|d| d.separator_value.as_str())
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "valid": true,
                    "destinations": destinations.len(),
                    "separators": separators,
                })
            );
        }
    }

    Ok(())
}
