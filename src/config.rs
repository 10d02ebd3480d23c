use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::announce::{Clip, Pacing};
use crate::chain::rate::DEFAULT_FALLBACK_RATE;
use crate::chain::WatcherConfig;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "SOUNDBOX_CONFIG";

/// Application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Merchant identity
    pub merchant: MerchantConfig,
    /// Chain subscription
    pub chain: ChainConfig,
    /// Exchange rate source
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Playback device and pacing
    #[serde(default)]
    pub audio: AudioConfig,
    /// Last-transaction ledger
    pub ledger: LedgerConfig,
    /// Logging
    pub telemetry: TelemetryConfig,
}

/// Merchant identity
#[derive(Debug, Deserialize, Clone)]
pub struct MerchantConfig {
    /// Address that receives payments
    pub address: String,
}

/// Chain subscription settings
#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    /// WebSocket endpoint
    pub ws_url: String,
    /// Seconds between keep-alive pings
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Seconds allowed for the connection handshake
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds between reconnection attempts
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
    /// Consecutive failed attempts before giving up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

/// How the exchange rate is obtained
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateMode {
    /// Query the price API per transaction
    #[default]
    Live,
    /// Always use `fallback_rate`
    Fixed,
}

/// Exchange rate settings
#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// Live lookup or fixed rate
    #[serde(default)]
    pub mode: RateMode,
    /// Price endpoint
    #[serde(default = "default_exchange_url")]
    pub url: String,
    /// Rupees per ether when the lookup fails (or always, in fixed mode)
    #[serde(default = "default_fallback_rate")]
    pub fallback_rate: f64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            mode: RateMode::default(),
            url: default_exchange_url(),
            fallback_rate: default_fallback_rate(),
        }
    }
}

/// Which playback device to open
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Log clips instead of playing them
    #[default]
    Log,
    /// Play WAV clips on the default output
    Clips,
}

/// Playback settings
#[derive(Debug, Deserialize, Clone)]
pub struct AudioConfig {
    /// Device to use
    #[serde(default)]
    pub device: DeviceKind,
    /// Directory holding `NNNN.wav` clips
    #[serde(default = "default_clips_dir")]
    pub clips_dir: String,
    /// Hold after a number clip, in milliseconds
    #[serde(default = "default_number_hold_ms")]
    pub number_hold_ms: u64,
    /// Hold after a word clip, in milliseconds
    #[serde(default = "default_named_hold_ms")]
    pub named_hold_ms: u64,
    /// Extra hold after the units and paise sections, in milliseconds
    #[serde(default = "default_section_gap_ms")]
    pub section_gap_ms: u64,
    /// Per-clip holds keyed by track number (`"205" = 1200`)
    #[serde(default)]
    pub overrides: HashMap<String, u64>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::default(),
            clips_dir: default_clips_dir(),
            number_hold_ms: default_number_hold_ms(),
            named_hold_ms: default_named_hold_ms(),
            section_gap_ms: default_section_gap_ms(),
            overrides: HashMap::new(),
        }
    }
}

impl AudioConfig {
    /// Builds the pacing table
    ///
    /// # Errors
    /// Returns error if an override key is not the track of a standard clip
    pub fn pacing(&self) -> Result<Pacing> {
        let mut overrides = HashMap::new();
        for (key, hold_ms) in &self.overrides {
            let track: u16 = key
                .trim_end_matches(".wav")
                .parse()
                .with_context(|| format!("invalid clip override key: {key}"))?;
            let clip = Clip::from_track(track)
                .ok_or_else(|| anyhow!("no clip with track {track}"))?;
            overrides.insert(clip, Duration::from_millis(*hold_ms));
        }

        Ok(Pacing {
            number_hold: Duration::from_millis(self.number_hold_ms),
            named_hold: Duration::from_millis(self.named_hold_ms),
            section_gap: Duration::from_millis(self.section_gap_ms),
            overrides,
        })
    }
}

/// Ledger settings
#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Ledger file
    pub path: String,
}

/// Logging settings
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Log to file instead of stdout
    pub enabled: bool,
    /// Log file
    pub log_path: String,
}

const fn default_keep_alive_secs() -> u64 {
    30
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_reconnect_interval_secs() -> u64 {
    5
}

const fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_exchange_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=inr".to_owned()
}

const fn default_fallback_rate() -> f64 {
    DEFAULT_FALLBACK_RATE
}

fn default_clips_dir() -> String {
    "~/.soundbox/clips".to_owned()
}

const fn default_number_hold_ms() -> u64 {
    800
}

const fn default_named_hold_ms() -> u64 {
    1000
}

const fn default_section_gap_ms() -> u64 {
    1000
}

const DEFAULT_CONFIG: &str = r#"[merchant]
address = "0x0000000000000000000000000000000000000000"

[chain]
ws_url = "wss://eth-sepolia.g.alchemy.com/v2/YOUR_API_KEY"
keep_alive_secs = 30
connect_timeout_secs = 10
reconnect_interval_secs = 5
max_reconnect_attempts = 5

[exchange]
mode = "live"
url = "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=inr"
fallback_rate = 80000.0

[audio]
device = "log"
clips_dir = "~/.soundbox/clips"
number_hold_ms = 800
named_hold_ms = 1000
section_gap_ms = 1000

[audio.overrides]

[ledger]
path = "~/.soundbox/ledger.toml"

[telemetry]
enabled = true
log_path = "~/.soundbox/soundbox.log"
"#;

impl Config {
    /// Load config from `$SOUNDBOX_CONFIG` or ~/.soundbox.toml
    ///
    /// A default file is written on first run.
    ///
    /// # Errors
    /// Returns error if the file cannot be created, read, or parsed
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        Self::parse(&contents)
    }

    /// Parses a TOML document
    ///
    /// # Errors
    /// Returns error on invalid TOML, missing sections, or out-of-range values
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("failed to parse config TOML")?;
        config.validate().context("invalid config")?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chain.keep_alive_secs == 0 {
            return Err(anyhow!("chain.keep_alive_secs must be at least 1"));
        }
        if self.chain.connect_timeout_secs == 0 {
            return Err(anyhow!("chain.connect_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    /// Settings for the chain watcher
    pub fn watcher(&self) -> WatcherConfig {
        WatcherConfig {
            url: self.chain.ws_url.clone(),
            merchant: self.merchant.address.clone(),
            keep_alive: Duration::from_secs(self.chain.keep_alive_secs),
            connect_timeout: Duration::from_secs(self.chain.connect_timeout_secs),
            reconnect_interval: Duration::from_secs(self.chain.reconnect_interval_secs),
            max_reconnect_attempts: self.chain.max_reconnect_attempts,
        }
    }

    fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::expand_path(&path);
        }
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".soundbox.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if the path starts with `~/` and `HOME` is not set
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::announce::NamedClip;

    const MINIMAL: &str = r#"
[merchant]
address = "0xabc"

[chain]
ws_url = "ws://localhost:1234"

[ledger]
path = "/tmp/ledger.toml"

[telemetry]
enabled = false
log_path = "/tmp/soundbox.log"
"#;

    #[test]
    fn test_default_config_parses() {
        let config = Config::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.exchange.mode, RateMode::Live);
        assert_eq!(config.audio.device, DeviceKind::Log);
        assert_eq!(config.chain.max_reconnect_attempts, 5);
        assert_eq!(config.exchange.fallback_rate, 80_000.0);
        assert!(config.telemetry.enabled);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.chain.keep_alive_secs, 30);
        assert_eq!(config.chain.reconnect_interval_secs, 5);
        assert_eq!(config.audio.number_hold_ms, 800);
        assert_eq!(config.exchange.fallback_rate, DEFAULT_FALLBACK_RATE);
        assert_eq!(config.audio.pacing().unwrap(), Pacing::default());
    }

    #[test]
    fn test_missing_merchant_is_error() {
        let without_merchant = MINIMAL.replace("[merchant]\naddress = \"0xabc\"\n", "");
        assert!(Config::parse(&without_merchant).is_err());
    }

    #[test]
    fn test_fixed_rate_mode() {
        let text = format!("{MINIMAL}\n[exchange]\nmode = \"fixed\"\nfallback_rate = 250000.0\n");
        let config = Config::parse(&text).unwrap();
        assert_eq!(config.exchange.mode, RateMode::Fixed);
        assert_eq!(config.exchange.fallback_rate, 250_000.0);
    }

    #[test]
    fn test_pacing_overrides() {
        let text = format!(
            "{MINIMAL}\n[audio]\ndevice = \"clips\"\nnumber_hold_ms = 500\n\n[audio.overrides]\n\"205\" = 1500\n\"0007.wav\" = 300\n"
        );
        let config = Config::parse(&text).unwrap();
        let pacing = config.audio.pacing().unwrap();

        assert_eq!(config.audio.device, DeviceKind::Clips);
        assert_eq!(pacing.number_hold, Duration::from_millis(500));
        assert_eq!(
            pacing.overrides.get(&Clip::Named(NamedClip::Rupees)),
            Some(&Duration::from_millis(1500))
        );
        assert_eq!(
            pacing.overrides.get(&Clip::Number(7)),
            Some(&Duration::from_millis(300))
        );
    }

    #[test]
    fn test_unknown_override_track_is_error() {
        let text = format!("{MINIMAL}\n[audio.overrides]\n\"0021\" = 100\n");
        let config = Config::parse(&text).unwrap();
        assert!(config.audio.pacing().is_err());
    }

    #[test]
    fn test_watcher_settings() {
        let watcher = Config::parse(MINIMAL).unwrap().watcher();
        assert_eq!(watcher.url, "ws://localhost:1234");
        assert_eq!(watcher.merchant, "0xabc");
        assert_eq!(watcher.keep_alive, Duration::from_secs(30));
        assert_eq!(watcher.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_keep_alive_is_rejected() {
        let text = MINIMAL.replace(
            "ws_url = \"ws://localhost:1234\"",
            "ws_url = \"ws://localhost:1234\"\nkeep_alive_secs = 0",
        );
        let err = Config::parse(&text).unwrap_err();
        assert!(format!("{err:#}").contains("keep_alive_secs"));
    }

    #[test]
    fn test_zero_connect_timeout_is_rejected() {
        let text = MINIMAL.replace(
            "ws_url = \"ws://localhost:1234\"",
            "ws_url = \"ws://localhost:1234\"\nconnect_timeout_secs = 0",
        );
        assert!(Config::parse(&text).is_err());
    }

    #[test]
    fn test_expand_path_without_tilde() {
        assert_eq!(
            Config::expand_path("/var/lib/soundbox").unwrap(),
            PathBuf::from("/var/lib/soundbox")
        );
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let home = std::env::var("HOME").expect("HOME not set");
        assert_eq!(
            Config::expand_path("~/clips").unwrap(),
            PathBuf::from(home).join("clips")
        );
    }
}
