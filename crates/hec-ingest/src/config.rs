// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::HecError;
use crate::tags::check_tag;
use reqwest::Url;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_TAG: &str = "default";
const DEFAULT_NAME: &str = "hec-loadgen";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CHANNEL_DEPTH: usize = 64;

/// Wire encoding used for every entry on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HecMode {
    /// Payload bytes followed by a newline, posted to the raw endpoint.
    Raw,
    /// One JSON object per entry carrying `event`, `time` and `sourcetype`.
    #[default]
    Event,
}

/// How event mode embeds payloads that look like JSON objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbedStrategy {
    /// Embed valid JSON objects as-is, quote everything else.
    #[default]
    Object,
    /// Always embed the payload as a JSON string.
    String,
    /// Alternate between embedding and quoting on every JSON-object payload,
    /// starting with embedding. Used to exercise both shapes on the backend.
    Alternate,
}

impl FromStr for EmbedStrategy {
    type Err = HecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "object" | "embed-as-object" => Ok(EmbedStrategy::Object),
            "string" | "embed-as-string" => Ok(EmbedStrategy::String),
            "alternate" => Ok(EmbedStrategy::Alternate),
            other => Err(HecError::Config(format!(
                "Invalid embed strategy '{other}'. Must be one of: object, string, alternate"
            ))),
        }
    }
}

/// Configuration for a HEC connection.
#[derive(Debug, Clone)]
pub struct HecConfig {
    /// Full collector URL, e.g. `https://splunk:8088/services/collector/event`
    pub url: String,
    /// HEC token, sent as `Authorization: Splunk <token>`
    pub token: String,
    /// Default tag; seeds tag id 0 and is sent as the sourcetype
    pub tag: String,
    pub mode: HecMode,
    pub embed: EmbedStrategy,
    /// Generator name, sent as the `User-Agent`
    pub name: String,
    /// Bound on the address probe and on connection establishment
    pub timeout: Duration,
    /// Whole-request timeout. The body is streamed for the connection's
    /// lifetime, so this is unset by default.
    pub request_timeout: Option<Duration>,
    /// Number of encoded entries buffered between writers and the request body
    pub channel_depth: usize,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for HecConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            tag: DEFAULT_TAG.to_string(),
            mode: HecMode::default(),
            embed: EmbedStrategy::default(),
            name: DEFAULT_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
            request_timeout: None,
            channel_depth: DEFAULT_CHANNEL_DEPTH,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl HecConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, HecError> {
        let url = env::var("HEC_URL")
            .map_err(|_| HecError::Config("HEC_URL must be set".to_string()))?;
        let token = env::var("HEC_TOKEN")
            .map_err(|_| HecError::Config("HEC_TOKEN must be set".to_string()))?;
        let tag = env::var("HEC_TAG").unwrap_or_else(|_| DEFAULT_TAG.to_string());
        let mode = if env::var("HEC_RAW")
            .map(|val| val.to_lowercase() == "true")
            .unwrap_or(false)
        {
            HecMode::Raw
        } else {
            HecMode::Event
        };
        let embed = match env::var("HEC_EMBED") {
            Ok(val) => val.parse()?,
            Err(_) => EmbedStrategy::default(),
        };
        let name = env::var("HEC_NAME").unwrap_or_else(|_| DEFAULT_NAME.to_string());
        let timeout = env::var("HEC_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        let request_timeout = env::var("HEC_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs);
        let channel_depth = env::var("HEC_CHANNEL_DEPTH")
            .ok()
            .and_then(|depth| depth.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CHANNEL_DEPTH);
        let https_proxy = env::var("HEC_PROXY_HTTPS")
            .or_else(|_| env::var("HTTPS_PROXY"))
            .ok();
        let log_level = env::var("HEC_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            url,
            token,
            tag,
            mode,
            embed,
            name,
            timeout,
            request_timeout,
            channel_depth,
            https_proxy,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), HecError> {
        self.endpoint()?;

        check_tag(&self.tag)
            .map_err(|e| HecError::Config(format!("Invalid default tag: {e}")))?;

        if self.timeout.is_zero() {
            return Err(HecError::Config(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.channel_depth == 0 {
            return Err(HecError::Config(
                "Channel depth must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(HecError::Config(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Parsed collector URL. Must be http(s) and carry a host.
    pub fn endpoint(&self) -> Result<Url, HecError> {
        let url = Url::parse(&self.url)
            .map_err(|e| HecError::Config(format!("Invalid HEC URL '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HecError::Config(format!(
                "Invalid HEC URL '{}': scheme must be http or https",
                self.url
            )));
        }
        if url.host_str().is_none() {
            return Err(HecError::Config(format!(
                "Invalid HEC URL '{}': missing host",
                self.url
            )));
        }
        Ok(url)
    }

    /// Value of the `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Splunk {}", self.token)
    }
}
