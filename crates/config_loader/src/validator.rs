//! Configuration validation
//!
//! Rules:
//! - field ranges declared on the contract types (`validator` derive)
//! - explicit source names are unique
//! - explicit source names are not blank

use std::collections::HashSet;

use contracts::{ContractError, ManagerConfig};
use validator::{Validate, ValidationErrors};

/// Validate a manager configuration
///
/// Returns the first error encountered.
pub fn validate(config: &ManagerConfig) -> Result<(), ContractError> {
    config.validate().map_err(|e| from_validation_errors(&e))?;
    validate_source_names(config)?;
    Ok(())
}

fn validate_source_names(config: &ManagerConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, entry) in config.sources.iter().enumerate() {
        let Some(name) = entry.config.name.as_deref() else {
            continue;
        };
        if name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("sources[{idx}].config.name"),
                "source name cannot be blank",
            ));
        }
        if !seen.insert(name) {
            return Err(ContractError::config_validation(
                format!("sources[{idx}].config.name"),
                format!("duplicate source name '{name}'"),
            ));
        }
    }
    Ok(())
}

/// First failing field, as a dotted path
fn from_validation_errors(errors: &ValidationErrors) -> ContractError {
    let mut path = Vec::new();
    let message = first_error(errors, &mut path).unwrap_or_else(|| errors.to_string());
    ContractError::config_validation(path.join("."), message)
}

fn first_error(errors: &ValidationErrors, path: &mut Vec<String>) -> Option<String> {
    use validator::ValidationErrorsKind;

    let (field, kind) = errors.errors().iter().next()?;
    path.push(field.to_string());
    match kind {
        ValidationErrorsKind::Field(errs) => errs.first().map(|e| {
            e.message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("failed '{}' check", e.code))
        }),
        ValidationErrorsKind::Struct(inner) => first_error(inner, path),
        ValidationErrorsKind::List(items) => {
            let (idx, inner) = items.iter().next()?;
            if let Some(last) = path.last_mut() {
                last.push_str(&format!("[{idx}]"));
            }
            first_error(inner, path)
        }
    }
}
