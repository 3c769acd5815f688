//! Template variable resolution.
//!
//! Each variable takes the first value found in this order: a value provided
//! by the caller, a value looked up in the trigger context, the declared
//! default. The chosen value is then coerced to the declared type and checked
//! against the validation rules.

use blueprint_core::{
    TemplateVariable, VariableMapping, VariableSource, VariableTransform, VariableType,
    VariableValidation,
};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::{Number, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::snapshot::{display_string, lookup_path};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VariableError {
    #[error("Required variable '{name}' has no value")]
    Missing { name: String },

    #[error("Variable '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

impl VariableError {
    fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn variable(&self) -> &str {
        match self {
            Self::Missing { name } | Self::Invalid { name, .. } => name,
        }
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    Provided,
    TriggerContext,
    Default,
}

impl ValueOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provided => "provided",
            Self::TriggerContext => "trigger_context",
            Self::Default => "default",
        }
    }
}

/// Resolve a batch of variables.
///
/// The first failure aborts the batch: later variables are not attempted and
/// no partial map is returned. Optional variables without a value are left
/// out of the map.
pub fn resolve_all(
    variables: &[TemplateVariable],
    provided: &HashMap<String, Value>,
    trigger_context: Option<&Value>,
) -> Result<HashMap<String, Value>, VariableError> {
    resolve_all_with(variables, provided, trigger_context, |_, _| {})
}

/// Like [`resolve_all`], reporting the origin of every resolved value.
pub fn resolve_all_with<F>(
    variables: &[TemplateVariable],
    provided: &HashMap<String, Value>,
    trigger_context: Option<&Value>,
    mut on_resolved: F,
) -> Result<HashMap<String, Value>, VariableError>
where
    F: FnMut(&str, ValueOrigin),
{
    let mut resolved = HashMap::with_capacity(variables.len());

    for variable in variables {
        if let Some((value, origin)) = resolve_one(variable, provided, trigger_context)? {
            on_resolved(&variable.name, origin);
            resolved.insert(variable.name.clone(), value);
        }
    }

    Ok(resolved)
}

/// Resolve, coerce and validate one variable. `Ok(None)` means an optional
/// variable with no value.
pub fn resolve_one(
    variable: &TemplateVariable,
    provided: &HashMap<String, Value>,
    trigger_context: Option<&Value>,
) -> Result<Option<(Value, ValueOrigin)>, VariableError> {
    let name = variable.name.as_str();

    let candidate = provided
        .get(name)
        .filter(|v| !v.is_null())
        .map(|v| (v.clone(), ValueOrigin::Provided))
        .or_else(|| {
            trigger_context
                .and_then(|ctx| lookup_context(ctx, name))
                .map(|v| (v.clone(), ValueOrigin::TriggerContext))
        })
        .or_else(|| {
            variable
                .default_value
                .as_ref()
                .filter(|v| !v.is_null())
                .map(|v| (v.clone(), ValueOrigin::Default))
        });

    let Some((raw, origin)) = candidate else {
        if variable.required {
            return Err(VariableError::Missing {
                name: name.to_string(),
            });
        }
        return Ok(None);
    };

    let value = coerce(name, variable.var_type, raw)?;
    if let Some(rules) = &variable.validation {
        validate(name, &value, rules)?;
    }

    Ok(Some((value, origin)))
}

/// Probe `name`, `jira.<name>`, `git.<name>` and `fields.<name>`, in order.
fn lookup_context<'a>(ctx: &'a Value, name: &str) -> Option<&'a Value> {
    [
        name.to_string(),
        format!("jira.{}", name),
        format!("git.{}", name),
        format!("fields.{}", name),
    ]
    .iter()
    .find_map(|path| lookup_path(ctx, path).filter(|v| !v.is_null()))
}

fn coerce(name: &str, var_type: VariableType, value: Value) -> Result<Value, VariableError> {
    match var_type {
        VariableType::String => match &value {
            Value::String(_) => Ok(value),
            Value::Number(_) | Value::Bool(_) | Value::Object(_) => display_string(&value)
                .map(Value::String)
                .ok_or_else(|| VariableError::invalid(name, "expected a string")),
            _ => Err(VariableError::invalid(name, "expected a string")),
        },
        VariableType::Number => match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => parse_number(s.trim())
                .ok_or_else(|| VariableError::invalid(name, format!("'{}' is not a number", s))),
            _ => Err(VariableError::invalid(name, "expected a number")),
        },
        VariableType::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(VariableError::invalid(name, "expected a boolean")),
        },
        VariableType::Date => match &value {
            Value::String(s) if is_date(s.trim()) => Ok(Value::String(s.trim().to_string())),
            _ => Err(VariableError::invalid(
                name,
                "expected an RFC 3339 timestamp or YYYY-MM-DD date",
            )),
        },
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn is_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

/// Apply the declared rules. Length and pattern rules apply to string values.
pub fn validate(
    name: &str,
    value: &Value,
    rules: &VariableValidation,
) -> Result<(), VariableError> {
    if let Value::String(s) = value {
        let length = s.chars().count();

        if let Some(min) = rules.min_length {
            if length < min {
                return Err(VariableError::invalid(
                    name,
                    format!("length {} is below minimum {}", length, min),
                ));
            }
        }

        if let Some(max) = rules.max_length {
            if length > max {
                return Err(VariableError::invalid(
                    name,
                    format!("length {} exceeds maximum {}", length, max),
                ));
            }
        }

        if let Some(pattern) = &rules.pattern {
            let re = Regex::new(pattern).map_err(|e| {
                VariableError::invalid(name, format!("invalid pattern '{}': {}", pattern, e))
            })?;
            if !re.is_match(s) {
                return Err(VariableError::invalid(
                    name,
                    format!("'{}' does not match pattern '{}'", s, pattern),
                ));
            }
        }
    }

    if let Some(options) = &rules.options {
        let as_text = display_string(value).unwrap_or_default();
        if !options.iter().any(|option| *option == as_text) {
            return Err(VariableError::invalid(
                name,
                format!("'{}' is not one of [{}]", as_text, options.join(", ")),
            ));
        }
    }

    Ok(())
}

/// Extract a trigger's mapped variables from the snapshot that fired it.
///
/// A mapping without an extracted value falls back to its own default; a
/// mapping with neither is left out so the template's cascade decides.
pub fn resolve_mapped(
    mappings: &HashMap<String, VariableMapping>,
    trigger_context: Option<&Value>,
) -> Result<HashMap<String, Value>, VariableError> {
    let mut names: Vec<&String> = mappings.keys().collect();
    names.sort();

    let mut values = HashMap::with_capacity(mappings.len());
    for name in names {
        let mapping = &mappings[name];
        let extracted = trigger_context.and_then(|ctx| extract(ctx, name, mapping));

        let Some(value) = extracted.or_else(|| mapping.default_value.clone()) else {
            continue;
        };

        let value = match &mapping.transform {
            Some(transform) => apply_transform(name, value, transform)?,
            None => value,
        };
        values.insert(name.clone(), value);
    }

    Ok(values)
}

fn extract(ctx: &Value, name: &str, mapping: &VariableMapping) -> Option<Value> {
    let path = mapping.field_path.as_deref().unwrap_or(name);

    let candidates: Vec<String> = match mapping.source {
        VariableSource::Static => return None,
        VariableSource::TriggerContext => vec![path.to_string()],
        VariableSource::Jira => vec![
            format!("jira.{}", path),
            format!("fields.{}", path),
            path.to_string(),
        ],
        VariableSource::Git => vec![format!("git.{}", path), path.to_string()],
    };

    candidates
        .iter()
        .find_map(|p| lookup_path(ctx, p).filter(|v| !v.is_null()))
        .cloned()
}

pub fn apply_transform(
    name: &str,
    value: Value,
    transform: &VariableTransform,
) -> Result<Value, VariableError> {
    let text = display_string(&value)
        .ok_or_else(|| VariableError::invalid(name, "cannot transform a non-scalar value"))?;

    let transformed = match transform {
        VariableTransform::Uppercase => text.to_uppercase(),
        VariableTransform::Lowercase => text.to_lowercase(),
        VariableTransform::Trim => text.trim().to_string(),
        VariableTransform::DateFormat { format } => format_date(name, text.trim(), format)?,
    };

    Ok(Value::String(transformed))
}

fn format_date(name: &str, text: &str, format: &str) -> Result<String, VariableError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(VariableError::invalid(
            name,
            format!("invalid date format '{}'", format),
        ));
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Ok(timestamp.format_with_items(items.into_iter()).to_string());
    }

    // Date-only values cannot render time fields
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| VariableError::invalid(name, format!("'{}' is not a date", text)))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| VariableError::invalid(name, format!("'{}' is not a date", text)))?;
    Ok(midnight.format_with_items(items.into_iter()).to_string())
}
