use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use tcp_probe::{Matcher, ProbeOptions};

/// Whether a target gets a single-attempt probe or a multi-attempt ping
/// each round.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Probe,
    Ping,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Probe => "probe",
            ProbeKind::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TargetConfig {
    pub name: String,
    pub kind: ProbeKind,
    /// Host name or IP, optionally as `host:port`.
    pub host: String,
    pub port: Option<u16>,
    pub attempts: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub response_timeout_ms: Option<u64>,
    /// Payload written after connecting. Enables probe-mode handling.
    pub request: Option<String>,
    /// Payload written right before closing.
    pub exit_request: Option<String>,
    /// Substring the response must contain.
    pub expect: Option<String>,
    /// Regular expression the response must match.
    pub expect_regex: Option<String>,
    #[serde(default)]
    pub capture: bool,
    pub max_response_bytes: Option<usize>,
    pub no_delay: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MonitorConfig {
    pub probe_interval_ms: u64,
    pub default_timeout_ms: u64,
    pub targets: Vec<TargetConfig>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_enable_latency_history")]
    pub enable_latency_history: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enable_latency_history() -> bool {
    false // Default to show current latency only
}

impl MonitorConfig {
    /// Get the log level as a tracing::Level
    pub fn get_tracing_level(&self) -> Result<tracing::Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(tracing::Level::TRACE),
            "debug" => Ok(tracing::Level::DEBUG),
            "info" => Ok(tracing::Level::INFO),
            "warn" | "warning" => Ok(tracing::Level::WARN),
            "error" => Ok(tracing::Level::ERROR),
            _ => Err(anyhow::anyhow!(
                "Invalid log level: {}. Valid levels are: trace, debug, info, warn, error",
                self.log_level
            )),
        }
    }
}

pub struct ConfigManager {
    pub config: Arc<RwLock<MonitorConfig>>,
}

impl ConfigManager {
    /// Load the config file and keep polling it for changes in the
    /// background. The file path comes from `TARGET_CONFIG` and defaults to
    /// `targets.json`.
    pub async fn start() -> Result<Self> {
        let config_file =
            std::env::var("TARGET_CONFIG").unwrap_or_else(|_| "targets.json".to_string());

        println!("Loading targets from: {}", config_file);

        let initial = Self::load_file_config(&config_file).await?;
        let config = Arc::new(RwLock::new(initial));

        let poll_interval_sec: u64 = std::env::var("CONFIG_POLL_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        // Spawn background task to watch the file for changes
        {
            let config_clone = config.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(tokio::time::Duration::from_secs(poll_interval_sec)).await;
                    match Self::load_file_config(&config_file).await {
                        Ok(new_cfg) => {
                            let mut c = config_clone.write().await;
                            if *c != new_cfg {
                                tracing::info!("Config file updated");
                                *c = new_cfg;
                            }
                        }
                        Err(e) => {
                            tracing::error!("Error reading config file {}: {:?}", config_file, e);
                        }
                    }
                }
            });
        }

        Ok(ConfigManager { config })
    }

    async fn load_file_config(file_path: &str) -> Result<MonitorConfig> {
        if !Path::new(file_path).exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", file_path));
        }

        let content = fs::read_to_string(file_path).await?;
        let config: MonitorConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}

impl TargetConfig {
    /// Map this target onto library probe options. `expect` and
    /// `expect_regex` are mutually exclusive.
    pub fn to_options(&self, default_timeout_ms: u64) -> Result<ProbeOptions> {
        let (address, port) = parse_host_port(&self.host, self.port.unwrap_or(80));

        let matcher = match (&self.expect, &self.expect_regex) {
            (Some(_), Some(_)) => {
                return Err(anyhow::anyhow!(
                    "Target {}: expect and expect_regex are mutually exclusive",
                    self.name
                ));
            }
            (Some(s), None) => Some(Matcher::bytes(s.clone())),
            (None, Some(pattern)) => Some(
                Matcher::regex(pattern)
                    .map_err(|e| anyhow::anyhow!("Target {}: {}", self.name, e))?,
            ),
            (None, None) => None,
        };

        Ok(ProbeOptions {
            address,
            port,
            attempts: self.attempts,
            timeout_ms: self.timeout_ms.unwrap_or(default_timeout_ms),
            response_timeout_ms: self.response_timeout_ms,
            request: self.request.as_ref().map(|s| s.clone().into_bytes()),
            exit_request: self.exit_request.as_ref().map(|s| s.clone().into_bytes()),
            matcher,
            capture: self.capture,
            max_response_bytes: self.max_response_bytes,
            no_delay: self.no_delay.unwrap_or(true),
        })
    }
}

fn parse_host_port(s: &str, default_port: u16) -> (String, u16) {
    if let Some((host, port)) = s.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            return (host.to_string(), port);
        }
    }
    (s.to_string(), default_port)
}
