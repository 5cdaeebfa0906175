//! `fanfetch validate`: check a configuration file for errors.
//!
//! Loads the file through the same [`FileSource`] the server uses, so the
//! format detection, parsing and validation rules are identical. Reports
//! the outcome as text or JSON.

use serde_json::json;

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::sources::FileSource;
use crate::config::validation;
use crate::config::ConfigSource;
use crate::error::{FanfetchError, ValidationError};

pub async fn execute(args: &ValidateArgs) -> Result<(), FanfetchError> {
    let source = FileSource::new(args.config.clone())?;
    let display = source.path().display().to_string();

    let (config, version) = match source.load().await {
        Ok(loaded) => loaded,
        Err(FanfetchError::ConfigValidation { errors }) => {
            report_errors(&display, &errors, &args.format);
            return Err(FanfetchError::ConfigValidation { errors });
        }
        Err(e) => return Err(e),
    };

    let warning = validation::retry_budget_warning(&config);
    match args.format {
        ValidateFormat::Text => {
            println!(
                "\u{2713} {}",
                validation::format_validation_report(&display, &config)
            );
            if let Some(warning) = warning {
                println!("  warning: {warning}");
            }
        }
        ValidateFormat::Json => {
            println!(
                "{}",
                json!({
                    "valid": true,
                    "version": version.to_string(),
                    "warning": warning,
                    "config": config,
                })
            );
        }
    }
    Ok(())
}

fn report_errors(display: &str, errors: &[ValidationError], format: &ValidateFormat) {
    match format {
        ValidateFormat::Text => {
            eprintln!("\u{2717} {display} has {} errors\n", errors.len());
            for error in errors {
                eprintln!("{error}");
            }
        }
        ValidateFormat::Json => {
            let errors: Vec<_> = errors
                .iter()
                .map(|e| {
                    json!({
                        "field": format!("{}.{}", e.section, e.field),
                        "message": e.message,
                        "suggestion": e.suggestion,
                    })
                })
                .collect();
            println!("{}", json!({ "valid": false, "errors": errors }));
        }
    }
}
