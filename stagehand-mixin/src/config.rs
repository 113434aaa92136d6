use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::error::Error;
use std::path::Path;
use std::time::Duration;

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct AsyncMixinConfigJson {
    #[serde(default)]
    pub start_delay_seconds: Option<f64>,
    #[serde(default)]
    pub condition_poll_interval_seconds: Option<f64>,
}

/// Timing knobs for the loading sequencer. Applies to sequences and conditions created on the
/// current thread after it is set.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AsyncMixinConfig {
    // How long after the first enqueue a sequence starts on its own. Zero means the next tick.
    pub start_delay: Duration,
    // How often an AsyncCondition re-evaluates its predicate while something waits on it
    pub condition_poll_interval: Duration,
}

impl Default for AsyncMixinConfig {
    fn default() -> Self {
        AsyncMixinConfig {
            start_delay: Duration::ZERO,
            condition_poll_interval: Duration::from_millis(160),
        }
    }
}

impl AsyncMixinConfig {
    fn parse_seconds(
        name: &str,
        seconds: Option<f64>,
        default: Duration,
    ) -> Result<Duration, Box<dyn Error>> {
        match seconds {
            None => Ok(default),
            Some(seconds) if seconds.is_finite() && seconds >= 0.0 => {
                Ok(Duration::from_secs_f64(seconds))
            }
            Some(seconds) => Err(format!("{} must be a non-negative number of seconds, got {}", name, seconds).into()),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, Box<dyn Error>> {
        let config_json: AsyncMixinConfigJson = serde_json::from_str(json)?;
        let defaults = AsyncMixinConfig::default();

        Ok(AsyncMixinConfig {
            start_delay: Self::parse_seconds(
                "start_delay_seconds",
                config_json.start_delay_seconds,
                defaults.start_delay,
            )?,
            condition_poll_interval: Self::parse_seconds(
                "condition_poll_interval_seconds",
                config_json.condition_poll_interval_seconds,
                defaults.condition_poll_interval,
            )?,
        })
    }

    pub fn read_from_path(path: &Path) -> Result<Self, Box<dyn Error>> {
        let file_contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&file_contents)
    }
}

thread_local! {
    static CURRENT_CONFIG: Cell<AsyncMixinConfig> = Cell::new(AsyncMixinConfig::default());
}

pub fn set_async_mixin_config(config: AsyncMixinConfig) {
    log::info!("Async mixin config {:?}", config);
    CURRENT_CONFIG.with(|x| x.set(config));
}

pub fn async_mixin_config() -> AsyncMixinConfig {
    CURRENT_CONFIG
        .try_with(|x| x.get())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = AsyncMixinConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AsyncMixinConfig::default());

        let config = AsyncMixinConfig::from_json_str(r#"{ "condition_poll_interval_seconds": 0.5 }"#).unwrap();
        assert_eq!(config.start_delay, Duration::ZERO);
        assert_eq!(config.condition_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn negative_durations_are_rejected() {
        assert!(AsyncMixinConfig::from_json_str(r#"{ "start_delay_seconds": -1.0 }"#).is_err());
        assert!(AsyncMixinConfig::from_json_str("[]").is_err());
    }

    #[test]
    fn config_is_per_thread() {
        let config = AsyncMixinConfig {
            start_delay: Duration::from_millis(32),
            condition_poll_interval: Duration::from_millis(16),
        };
        set_async_mixin_config(config);
        assert_eq!(async_mixin_config(), config);

        let other_thread = std::thread::spawn(async_mixin_config).join().unwrap();
        assert_eq!(other_thread, AsyncMixinConfig::default());
    }
}
