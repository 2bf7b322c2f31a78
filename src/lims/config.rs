//! Client Configuration
//!
//! Reads `~/.bfabricpy.yml` and selects one environment from it.
//!
//! # Environment Resolution Priority
//!
//! 1. An explicit environment name (e.g. from the command line)
//! 2. The `BFABRICPY_CONFIG_ENV` environment variable
//! 3. `GENERAL.default_config` from the config file
//!
//! `BFABRICPY_CONFIG_OVERRIDE` may hold inline YAML that is used instead of the
//! file: either a full config document or `{client: {...}, auth: {...}}`.
//!
//! # Example
//!
//! ```yaml
//! GENERAL:
//!   default_config: TEST
//! TEST:
//!   base_url: https://fgcz-bfabric-test.uzh.ch/bfabric
//!   login: user
//!   password: secret
//! __MOCK:
//!   store: /tmp/mock_store.yml
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::client::LimsClient;
use super::mock::MockClient;
use crate::error::{AppRunnerError, IoContext, Result};
use crate::util::paths::home_dir;

/// Selects the environment.
pub const CONFIG_ENV_VAR: &str = "BFABRICPY_CONFIG_ENV";

/// Inline YAML replacing the config file.
pub const CONFIG_OVERRIDE_VAR: &str = "BFABRICPY_CONFIG_OVERRIDE";

/// Environment name of the in-process mock LIMS.
pub const MOCK_ENVIRONMENT: &str = "__MOCK";

const GENERAL_SECTION: &str = "GENERAL";
const RESERVED_ENVIRONMENT: &str = "default";

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct GeneralConfig {
    default_config: Option<String>,
}

/// Settings of one environment.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Backing file of the mock LIMS.
    #[serde(default)]
    pub store: Option<PathBuf>,
}

/// The environment chosen for this process.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub environment: String,
    pub config: EnvironmentConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OverrideConfig {
    #[serde(default)]
    client: EnvironmentConfig,
    #[serde(default)]
    auth: AuthOverride,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthOverride {
    login: Option<String>,
    password: Option<String>,
}

/// Default location of the config file.
pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".bfabricpy.yml"))
}

/// Loads the settings using the process environment and the default config
/// file location.
pub fn load_client_settings(explicit_env: Option<&str>) -> Result<ClientSettings> {
    let override_text = env::var(CONFIG_OVERRIDE_VAR).ok().filter(|s| !s.trim().is_empty());
    let env_var = env::var(CONFIG_ENV_VAR).ok().filter(|s| !s.trim().is_empty());

    let config_text = match (&override_text, default_config_path()) {
        (None, Some(path)) if path.exists() => {
            debug!("Reading client config from {}", path.display());
            Some(fs::read_to_string(&path).with_path(&path)?)
        }
        _ => None,
    };

    resolve_settings(
        config_text.as_deref(),
        override_text.as_deref(),
        explicit_env,
        env_var.as_deref(),
    )
}

/// Chooses the environment from already-read inputs.
pub fn resolve_settings(
    config_text: Option<&str>,
    override_text: Option<&str>,
    explicit_env: Option<&str>,
    env_var: Option<&str>,
) -> Result<ClientSettings> {
    if let Some(text) = override_text {
        return resolve_override(text, explicit_env, env_var);
    }

    let (general, environments) = match config_text {
        Some(text) => parse_config_document(text)?,
        None => (GeneralConfig::default(), BTreeMap::new()),
    };

    let environment = explicit_env
        .or(env_var)
        .or(general.default_config.as_deref())
        .ok_or_else(|| {
            AppRunnerError::Config(
                "no environment selected: pass one explicitly, set BFABRICPY_CONFIG_ENV or GENERAL.default_config"
                    .to_string(),
            )
        })?
        .to_string();

    let config = match environments.get(&environment) {
        Some(config) => config.clone(),
        None if environment == MOCK_ENVIRONMENT => EnvironmentConfig::default(),
        None => {
            return Err(AppRunnerError::Config(format!(
                "environment '{}' is not defined in the config file (available: {})",
                environment,
                environments.keys().cloned().collect::<Vec<_>>().join(", ")
            )))
        }
    };

    info!("Using LIMS environment: {}", environment);
    Ok(ClientSettings { environment, config })
}

fn parse_config_document(
    text: &str,
) -> Result<(GeneralConfig, BTreeMap<String, EnvironmentConfig>)> {
    let mut sections: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(text)
        .map_err(|e| AppRunnerError::Config(format!("invalid config file: {}", e)))?;

    let general = match sections.remove(GENERAL_SECTION) {
        Some(value) => serde_yaml::from_value(value)
            .map_err(|e| AppRunnerError::Config(format!("invalid GENERAL section: {}", e)))?,
        None => GeneralConfig::default(),
    };

    if sections.contains_key(RESERVED_ENVIRONMENT) {
        return Err(AppRunnerError::Config(
            "'default' is a reserved environment name".to_string(),
        ));
    }

    let mut environments = BTreeMap::new();
    for (name, value) in sections {
        let config: EnvironmentConfig = serde_yaml::from_value(value).map_err(|e| {
            AppRunnerError::Config(format!("invalid environment '{}': {}", name, e))
        })?;
        environments.insert(name, config);
    }

    Ok((general, environments))
}

fn resolve_override(
    text: &str,
    explicit_env: Option<&str>,
    env_var: Option<&str>,
) -> Result<ClientSettings> {
    let value: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| AppRunnerError::Config(format!("invalid {}: {}", CONFIG_OVERRIDE_VAR, e)))?;

    let is_partial = value
        .as_mapping()
        .map(|m| m.keys().all(|k| matches!(k.as_str(), Some("client") | Some("auth"))))
        .unwrap_or(false);

    if !is_partial {
        return resolve_settings(Some(text), None, explicit_env, env_var);
    }

    let parsed: OverrideConfig = serde_yaml::from_value(value)
        .map_err(|e| AppRunnerError::Config(format!("invalid {}: {}", CONFIG_OVERRIDE_VAR, e)))?;
    let mut config = parsed.client;
    if parsed.auth.login.is_some() {
        config.login = parsed.auth.login;
    }
    if parsed.auth.password.is_some() {
        config.password = parsed.auth.password;
    }

    let environment = explicit_env.or(env_var).unwrap_or("OVERRIDE").to_string();
    info!("Using LIMS environment from {}: {}", CONFIG_OVERRIDE_VAR, environment);
    Ok(ClientSettings { environment, config })
}

/// Creates the client for the selected environment.
///
/// Only the mock environment is served in-process; every other environment
/// needs the SOAP transport.
pub fn connect(settings: &ClientSettings) -> Result<Box<dyn LimsClient>> {
    if settings.environment == MOCK_ENVIRONMENT {
        let client = match &settings.config.store {
            Some(path) => MockClient::from_store_file(path)?,
            None => MockClient::new(),
        };
        return Ok(Box::new(client));
    }

    Err(AppRunnerError::Config(format!(
        "environment '{}' ({}) requires the SOAP transport, which this build does not provide; use {}",
        settings.environment,
        settings.config.base_url.as_deref().unwrap_or("no base_url"),
        MOCK_ENVIRONMENT
    )))
}
