//! Template Interpolation
//!
//! Spec documents may use `${namespace.attribute}` placeholders inside string
//! values. Interpolation walks an already parsed document and renders every
//! string leaf; keys and non-string scalars are left untouched.
//!
//! # Variables
//!
//! - `app.id`, `app.name`, `app.version`
//! - `workunit.id`, `workunit.file_token` (only once a workunit is bound)

use std::fmt;

use log::debug;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{AppRunnerError, Result};

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").expect("valid regex"));

static EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)\s*$").expect("valid regex")
});

/// Replaces every run of characters outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_app_name(name: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(name, "_").into_owned()
}

/// App variables, available as `${app.*}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariablesApp {
    pub id: i64,
    pub name: String,
    pub version: String,
}

impl VariablesApp {
    /// Creates the variables, sanitising `name`.
    pub fn new(id: i64, name: &str, version: impl Into<String>) -> Self {
        Self {
            id,
            name: sanitize_app_name(name),
            version: version.into(),
        }
    }
}

/// Workunit variables, available as `${workunit.*}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariablesWorkunit {
    pub id: i64,
    /// Random hex token for uniquifying paths.
    pub file_token: String,
}

impl VariablesWorkunit {
    /// Creates the variables with a fresh random `file_token`.
    pub fn new(id: i64) -> Self {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self {
            id,
            file_token: hex::encode(bytes),
        }
    }
}

/// The closed variable namespace used for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Variables {
    pub app: VariablesApp,
    pub workunit: Option<VariablesWorkunit>,
}

impl fmt::Display for Variables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "app(id={}, name={}, version={})",
            self.app.id, self.app.name, self.app.version
        )?;
        if let Some(workunit) = &self.workunit {
            write!(f, " workunit(id={})", workunit.id)?;
        }
        Ok(())
    }
}

impl Variables {
    fn lookup(&self, namespace: &str, attribute: &str) -> Option<String> {
        match (namespace, attribute) {
            ("app", "id") => Some(self.app.id.to_string()),
            ("app", "name") => Some(self.app.name.clone()),
            ("app", "version") => Some(self.app.version.clone()),
            ("workunit", "id") => self.workunit.as_ref().map(|w| w.id.to_string()),
            ("workunit", "file_token") => self.workunit.as_ref().map(|w| w.file_token.clone()),
            _ => None,
        }
    }
}

/// Renders all `${...}` placeholders of one string.
pub fn render_template(template: &str, variables: &Variables) -> Result<String> {
    let error = |message: String| AppRunnerError::Interpolation {
        template: template.to_string(),
        message,
    };

    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| error("unterminated '${'".to_string()))?;
        let expression = &after[..end];

        let captures = EXPRESSION
            .captures(expression)
            .ok_or_else(|| error(format!("unsupported expression '{}'", expression.trim())))?;
        let namespace = &captures[1];
        let attribute = &captures[2];

        let value = variables.lookup(namespace, attribute).ok_or_else(|| {
            if namespace == "workunit" && variables.workunit.is_none() {
                error("workunit variables are not available here".to_string())
            } else {
                error(format!("undefined variable '{}.{}'", namespace, attribute))
            }
        })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

/// Renders every string leaf of `data`, recursing into sequences and
/// mapping values.
pub fn interpolate_config_strings(data: Value, variables: &Variables) -> Result<Value> {
    debug!("Interpolating config strings with variables: {}", variables);
    interpolate_value(data, variables)
}

fn interpolate_value(data: Value, variables: &Variables) -> Result<Value> {
    Ok(match data {
        Value::String(s) => Value::String(render_template(&s, variables)?),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| interpolate_value(item, variables))
                .collect::<Result<_>>()?,
        ),
        Value::Mapping(mapping) => {
            let mut result = serde_yaml::Mapping::with_capacity(mapping.len());
            for (key, value) in mapping {
                result.insert(key, interpolate_value(value, variables)?);
            }
            Value::Mapping(result)
        }
        other => other,
    })
}
