use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::queue::DEFAULT_QUEUE_TTL;

/// Path appended to `ajaxUrl` for every delivery.
const HB_PATH: &str = "/commercial/api/hb";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ajaxUrl is not defined. Analytics won't work")]
    AjaxUrlMissing,

    #[error("ajaxUrl is not a valid URL: {0}")]
    AjaxUrlInvalid(String),

    #[error("pv is not defined. Analytics won't work")]
    PvMissing,

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),
}

/// Caller-supplied page/protocol version tag. Serialized back exactly as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageVersion {
    Text(String),
    Number(serde_json::Number),
}

impl PageVersion {
    /// `""` and `0` count as missing.
    fn is_present(&self) -> bool {
        match self {
            PageVersion::Text(s) => !s.is_empty(),
            PageVersion::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        }
    }
}

/// Options handed to the adapter at activation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterOptions {
    pub ajax_url: Option<String>,
    pub pv: Option<PageVersion>,
}

/// Options that passed validation: a ready-to-use endpoint and a present `pv`.
#[derive(Debug, Clone)]
pub struct ValidatedOptions {
    pub endpoint: Url,
    pub pv: PageVersion,
}

impl AdapterOptions {
    pub fn validate(&self) -> Result<ValidatedOptions, ConfigError> {
        let ajax_url = self
            .ajax_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::AjaxUrlMissing)?;

        let pv = self
            .pv
            .clone()
            .filter(PageVersion::is_present)
            .ok_or(ConfigError::PvMissing)?;

        let raw = format!("{ajax_url}{HB_PATH}");
        let endpoint =
            Url::parse(&raw).map_err(|_| ConfigError::AjaxUrlInvalid(ajax_url.to_owned()))?;

        Ok(ValidatedOptions { endpoint, pv })
    }
}

#[derive(Debug)]
pub struct Config {
    pub listener_port: u16,
    pub queue_ttl: Duration,
    pub shutdown_grace: Duration,
    pub options: AdapterOptions,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("HB_ANALYTICS_"))
            .collect();
        Self::parse(&vars)
    }

    /// Adapter options are carried through unvalidated: a missing `ajaxUrl`
    /// or `pv` disables analytics at activation but does not stop the service.
    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let listener_port = parse_port(vars, "HB_ANALYTICS_LISTENER_PORT", 4320)?;
        let queue_ttl = parse_duration_ms(
            vars,
            "HB_ANALYTICS_QUEUE_TTL_MS",
            DEFAULT_QUEUE_TTL.as_millis() as u64,
        )?;
        let shutdown_grace = parse_duration_ms(vars, "HB_ANALYTICS_SHUTDOWN_GRACE_MS", 2000)?;
        let options = parse_options(vars);

        Ok(Self {
            listener_port,
            queue_ttl,
            shutdown_grace,
            options,
        })
    }
}

fn parse_options(vars: &HashMap<String, String>) -> AdapterOptions {
    AdapterOptions {
        ajax_url: vars.get("HB_ANALYTICS_AJAX_URL").cloned(),
        pv: vars
            .get("HB_ANALYTICS_PV")
            .map(|raw| PageVersion::Text(raw.clone())),
    }
}

fn parse_port(
    vars: &HashMap<String, String>,
    name: &str,
    default: u16,
) -> Result<u16, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}
