use crate::analysis::analyzer::{DEFAULT_CONDITION_CAPACITY, VOLATILITY_WINDOW};
use crate::analysis::forecast::MIN_FORECAST_SAMPLES;
use crate::error::SettingsError;
use crate::execution::{EngineState, ExecutorConfig, DEFAULT_HISTORY_CAPACITY};
use crate::risk::SuspicionRules;
use crate::strategy::GateConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "SONICBOT";
const DEFAULT_CONFIG_NAME: &str = "sonicbot";

/// Upper bound for `sampler.max_retries`; backoff doubles per attempt
pub const MAX_SAMPLER_RETRIES: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub trading: TradingSettings,
    pub sampler: SamplerSettings,
    pub risk: RiskSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub history_capacity: usize,
    pub condition_history_capacity: usize,
    pub poll_interval_secs: u64,
    pub sampler_backoff_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            condition_history_capacity: DEFAULT_CONDITION_CAPACITY,
            poll_interval_secs: 60,
            sampler_backoff_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TradingSettings {
    pub cooldown_secs: u64,
    pub min_confidence: f64,
    pub trading_enabled: bool,
    pub confirm_timeout_secs: u64,
    pub gas_limit: u64,
    pub trade_amount: f64,
    pub price_move_threshold: f64,
    pub volume_multiplier: f64,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            min_confidence: 0.7,
            trading_enabled: true,
            confirm_timeout_secs: 120,
            gas_limit: 2_000_000,
            trade_amount: 0.1,
            price_move_threshold: 1.02,
            volume_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplerSettings {
    pub price_url: String,
    pub volume_url: String,
    pub requests_per_minute: u32,
    pub max_retries: u32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            price_url: "http://127.0.0.1:8080/price".to_string(),
            volume_url: "http://127.0.0.1:8080/volume".to_string(),
            requests_per_minute: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskSettings {
    pub event_window: usize,
    pub max_event_value: Option<f64>,
    pub max_events_per_address: Option<usize>,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            event_window: 1000,
            max_event_value: None,
            max_events_per_address: None,
        }
    }
}

impl Settings {
    /// Load settings from `.env`, an optional config file and the environment
    ///
    /// Without `path`, a `sonicbot.{toml,yaml,json}` in the working directory is
    /// used when present. Environment variables such as
    /// `SONICBOT__TRADING__COOLDOWN_SECS` override both.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let engine = &self.engine;
        if engine.history_capacity < 1 {
            return Err(invalid("engine.history_capacity must be >= 1"));
        }
        if engine.condition_history_capacity < VOLATILITY_WINDOW {
            return Err(invalid(format!(
                "engine.condition_history_capacity must be >= {}",
                VOLATILITY_WINDOW
            )));
        }
        if engine.poll_interval_secs == 0 {
            return Err(invalid("engine.poll_interval_secs must be > 0"));
        }
        if engine.sampler_backoff_secs == 0 {
            return Err(invalid("engine.sampler_backoff_secs must be > 0"));
        }

        let trading = &self.trading;
        if cooldown_duration(trading.cooldown_secs).is_none() {
            return Err(invalid(format!(
                "trading.cooldown_secs {} is out of range",
                trading.cooldown_secs
            )));
        }
        if !(0.0..=1.0).contains(&trading.min_confidence) {
            return Err(invalid("trading.min_confidence must be within [0, 1]"));
        }
        if trading.confirm_timeout_secs == 0 {
            return Err(invalid("trading.confirm_timeout_secs must be > 0"));
        }
        if !(trading.trade_amount.is_finite() && trading.trade_amount > 0.0) {
            return Err(invalid("trading.trade_amount must be > 0"));
        }

        if self.sampler.requests_per_minute == 0 {
            return Err(invalid("sampler.requests_per_minute must be > 0"));
        }
        if self.sampler.max_retries > MAX_SAMPLER_RETRIES {
            return Err(invalid(format!(
                "sampler.max_retries must be <= {}",
                MAX_SAMPLER_RETRIES
            )));
        }
        if self.risk.event_window == 0 {
            return Err(invalid("risk.event_window must be >= 1"));
        }

        if engine.history_capacity < MIN_FORECAST_SAMPLES {
            tracing::warn!(
                "engine.history_capacity {} is below {}: the forecaster will never fit",
                engine.history_capacity,
                MIN_FORECAST_SAMPLES
            );
        }

        Ok(())
    }

    pub fn engine_state(&self) -> EngineState {
        // Out-of-range values are rejected by `validate`
        let cooldown =
            cooldown_duration(self.trading.cooldown_secs).unwrap_or(chrono::Duration::MAX);
        let mut state = EngineState::new(cooldown, self.trading.min_confidence);
        state.trading_enabled = self.trading.trading_enabled;
        state
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            price_move_threshold: self.trading.price_move_threshold,
            volume_multiplier: self.trading.volume_multiplier,
            volatility_window: VOLATILITY_WINDOW,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            confirm_timeout: Duration::from_secs(self.trading.confirm_timeout_secs),
            trade_amount: self.trading.trade_amount,
            gas_limit: self.trading.gas_limit,
        }
    }

    pub fn suspicion_rules(&self) -> SuspicionRules {
        SuspicionRules {
            max_event_value: self.risk.max_event_value,
            max_events_per_address: self.risk.max_events_per_address,
        }
    }
}

fn cooldown_duration(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

fn invalid(message: impl Into<String>) -> SettingsError {
    SettingsError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("sonicbot-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.engine.history_capacity, 100);
        assert_eq!(settings.trading.cooldown_secs, 300);
        assert_eq!(settings.trading.min_confidence, 0.7);
        assert_eq!(settings.trading.gas_limit, 2_000_000);
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let mut settings = Settings::default();
        settings.trading.min_confidence = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid(msg)) if msg.contains("min_confidence")
        ));
    }

    #[test]
    fn test_rejects_small_condition_history() {
        let mut settings = Settings::default();
        settings.engine.condition_history_capacity = 5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let mut settings = Settings::default();
        settings.engine.poll_interval_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.trading.confirm_timeout_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_cooldown_beyond_duration_range() {
        let mut settings = Settings::default();
        settings.trading.cooldown_secs = 100_000_000_000_000_000;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid(msg)) if msg.contains("cooldown_secs")
        ));

        // Would wrap negative with a plain cast
        settings.trading.cooldown_secs = u64::MAX;
        assert!(settings.validate().is_err());

        // Conversion never panics, even when validation was skipped
        assert_eq!(settings.engine_state().cooldown, chrono::Duration::MAX);
    }

    #[test]
    fn test_rejects_too_many_retries() {
        let mut settings = Settings::default();
        settings.sampler.max_retries = MAX_SAMPLER_RETRIES;
        assert!(settings.validate().is_ok());

        settings.sampler.max_retries = 65;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid(msg)) if msg.contains("max_retries")
        ));
    }

    #[test]
    fn test_small_history_only_warns() {
        let mut settings = Settings::default();
        settings.engine.history_capacity = 10;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let path = write_temp(
            r#"
[trading]
cooldown_secs = 60
trading_enabled = false

[risk]
max_event_value = 5000.0
"#,
        );

        let settings = Settings::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.trading.cooldown_secs, 60);
        assert!(!settings.trading.trading_enabled);
        // Untouched keys keep their defaults
        assert_eq!(settings.trading.min_confidence, 0.7);
        assert_eq!(settings.engine.poll_interval_secs, 60);
        assert_eq!(settings.suspicion_rules().max_event_value, Some(5000.0));

        let state = settings.engine_state();
        assert!(!state.trading_enabled);
        assert_eq!(state.cooldown, chrono::Duration::seconds(60));
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let path = write_temp("[engine]\nhistory_capacity = 0\n");
        let result = Settings::load(Some(&path));
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let path = std::env::temp_dir().join("sonicbot-does-not-exist.toml");
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(SettingsError::Load(_))
        ));
    }

    #[test]
    fn test_environment_override() {
        std::env::set_var("SONICBOT__RISK__EVENT_WINDOW", "42");
        let settings = Settings::load(None);
        std::env::remove_var("SONICBOT__RISK__EVENT_WINDOW");

        assert_eq!(settings.unwrap().risk.event_window, 42);
    }

    #[test]
    fn test_component_configs() {
        let settings = Settings::default();
        assert_eq!(settings.executor_config().confirm_timeout, Duration::from_secs(120));
        assert_eq!(settings.gate_config().price_move_threshold, 1.02);
        assert_eq!(settings.gate_config().volatility_window, 20);
    }
}
