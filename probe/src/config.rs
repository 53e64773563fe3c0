//! Runtime configuration (spec §6 "Configuration"): `default` + `NODE_ENV`
//! overlay + environment variables, following the teacher's `config.rs`
//! layering.

use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub uptime: UptimeConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub http_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default = "default_release_url")]
    pub release_url: String,
    #[serde(default = "default_update_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_update_max_deviation")]
    pub max_deviation_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_number_of_packets")]
    pub number_of_packets: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeConfig {
    #[serde(default = "default_uptime_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_uptime_max_deviation")]
    pub max_deviation_secs: u64,
    #[serde(default = "default_max_uptime")]
    pub max_uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_commands_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub mtr: MtrCommandConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtrCommandConfig {
    #[serde(default = "default_mtr_interval_ms")]
    pub interval_ms: u64,
}

fn default_release_url() -> String {
    "https://api.github.com/repos/jsdelivr/globalping-probe/releases/latest".to_string()
}
fn default_update_interval() -> u64 {
    15 * 60
}
fn default_update_max_deviation() -> u64 {
    5 * 60
}
fn default_number_of_packets() -> u16 {
    6
}
fn default_stats_interval() -> u64 {
    10
}
fn default_uptime_interval() -> u64 {
    60 * 60
}
fn default_uptime_max_deviation() -> u64 {
    10 * 60
}
fn default_max_uptime() -> u64 {
    7 * 24 * 60 * 60
}
fn default_commands_timeout() -> u64 {
    25
}
fn default_mtr_interval_ms() -> u64 {
    500
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            release_url: default_release_url(),
            interval_secs: default_update_interval(),
            max_deviation_secs: default_update_max_deviation(),
        }
    }
}
impl Default for StatusConfig {
    fn default() -> Self {
        Self { number_of_packets: default_number_of_packets() }
    }
}
impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: default_stats_interval() }
    }
}
impl Default for UptimeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_uptime_interval(),
            max_deviation_secs: default_uptime_max_deviation(),
            max_uptime_secs: default_max_uptime(),
        }
    }
}
impl Default for MtrCommandConfig {
    fn default() -> Self {
        Self { interval_ms: default_mtr_interval_ms() }
    }
}
impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_commands_timeout(),
            mtr: MtrCommandConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("NODE_ENV").unwrap_or_else(|_| "production".to_string());
        let overlay_path = format!("probe.{}", env);

        let config = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG_TOML, config::FileFormat::Toml))
            .add_source(config::File::with_name(&overlay_path).required(false))
            .add_source(config::Environment::with_prefix("PROBE").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            eprintln!("Warning: failed to load config: {}. Using built-in defaults.", e);
            toml::from_str(DEFAULT_CONFIG_TOML).expect("built-in default.toml must parse")
        })
    }
}
