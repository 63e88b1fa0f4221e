//! Client-side validation of collect step answers

use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::profile::{FieldKind, FieldName, FieldValue, ProfileRecord};
use crate::steps::registry::{StepDescriptor, StepKind};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{8,15}$").unwrap());

/// An answer that blocks the step transition
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: FieldName,
    pub message: String,
}

impl ValidationError {
    fn new(field: FieldName, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate every field owned by `step` against today's date
pub fn validate_step(step: &StepDescriptor, profile: &ProfileRecord) -> Result<(), ValidationError> {
    validate_step_on(step, profile, Local::now().date_naive())
}

/// Validate every field owned by `step`. Entry and result steps always pass.
pub fn validate_step_on(
    step: &StepDescriptor,
    profile: &ProfileRecord,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    if step.kind != StepKind::Collect {
        return Ok(());
    }

    for field in &step.owned_fields {
        validate_field(*field, profile.get(*field), today)?;
    }
    Ok(())
}

/// Validate a single answer
pub fn validate_field(
    field: FieldName,
    value: Option<&FieldValue>,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    let Some(value) = value else {
        return Err(ValidationError::new(field, "this question is required"));
    };

    let kind = field.kind();
    if !value.matches_kind(kind) {
        return Err(ValidationError::new(field, "answer has the wrong type"));
    }

    match (kind, value) {
        (FieldKind::Text, FieldValue::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(ValidationError::new(field, "this question is required"));
            }
            match field {
                FieldName::Email if !EMAIL_RE.is_match(text) => {
                    Err(ValidationError::new(field, "enter a valid e-mail address"))
                }
                FieldName::Phone => {
                    let digits: String = text.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
                    if PHONE_RE.is_match(&digits) {
                        Ok(())
                    } else {
                        Err(ValidationError::new(
                            field,
                            "enter 8 to 15 digits, optionally starting with +",
                        ))
                    }
                }
                _ => Ok(()),
            }
        }
        (FieldKind::Choice(options), FieldValue::Choice(choice)) => {
            if options.contains(&choice.as_str()) {
                Ok(())
            } else {
                Err(ValidationError::new(
                    field,
                    format!("choose one of: {}", options.join(", ")),
                ))
            }
        }
        (FieldKind::Number { min, max, integer }, FieldValue::Number(n)) => {
            if !n.is_finite() || *n < min || *n > max {
                Err(ValidationError::new(
                    field,
                    format!("must be between {} and {}", min, max),
                ))
            } else if integer && n.fract() != 0.0 {
                Err(ValidationError::new(field, "must be a whole number"))
            } else {
                Ok(())
            }
        }
        (FieldKind::Date, FieldValue::Date(date)) => {
            if *date > today {
                Err(ValidationError::new(field, "date cannot be in the future"))
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}
