//! # Global runtime configuration.
//!
//! [`Config`] carries the validated values of the event section of the
//! assistant's configuration file plus the plugin auto-load directory.
//! Parsing the file itself is an embedder concern; the runtime only checks
//! ranges via [`Config::validate`] during [`Runtime::init`](crate::Runtime::init).
//!
//! | Config key        | Field             | Range                      | Default |
//! |-------------------|-------------------|----------------------------|---------|
//! | `IDLE_SLEEP_TIME` | `idle_sleep`      | 1–1000 ms                  | 10 ms   |
//! | `TICK_RESOLUTION` | `tick_resolution` | `idle_sleep`–1000 ms       | 10 ms   |
//! | `DIR` (plugins)   | `plugin_dir`      | any path, optional         | none    |
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use famulus::Config;
//!
//! let mut cfg = Config::default();
//! cfg.idle_sleep = Duration::from_millis(5);
//! cfg.tick_resolution = Duration::from_millis(20);
//!
//! assert!(cfg.validate().is_ok());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::error::RuntimeError;

/// Configuration for the event dispatcher, the timer service, and the
/// plugin manager.
#[derive(Clone, Debug)]
pub struct Config {
    /// Sleep between event-dispatch loop iterations (`IDLE_SLEEP_TIME`).
    pub idle_sleep: Duration,
    /// Minimum interval between timer-fire passes (`TICK_RESOLUTION`).
    pub tick_resolution: Duration,
    /// How long the dispatcher waits for a handler to acknowledge a
    /// suspension request before logging a warning. The wait itself never
    /// gives up; responsiveness is bounded by the handler's checkpoint
    /// interval.
    pub suspend_grace: Duration,
    /// Directory to auto-load plugin libraries from at init (`DIR`).
    /// When `None`, no auto-load happens.
    pub plugin_dir: Option<PathBuf>,
}

impl Default for Config {
    /// Provides the default configuration:
    /// - `idle_sleep = 10ms`
    /// - `tick_resolution = 10ms`
    /// - `suspend_grace = 1s`
    /// - `plugin_dir = None`
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_millis(10),
            tick_resolution: Duration::from_millis(10),
            suspend_grace: Duration::from_secs(1),
            plugin_dir: None,
        }
    }
}

impl Config {
    /// Checks every value against its documented range.
    ///
    /// Called by [`Runtime::init`](crate::Runtime::init) before any
    /// subsystem is brought up; a rejected value aborts init.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        range_ms("IDLE_SLEEP_TIME", self.idle_sleep, 1, 1000)?;
        range_ms(
            "TICK_RESOLUTION",
            self.tick_resolution,
            self.idle_sleep.as_millis() as u64,
            1000,
        )?;
        if self.suspend_grace.is_zero() {
            return Err(RuntimeError::Config {
                key: "SUSPEND_GRACE",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn range_ms(key: &'static str, value: Duration, min: u64, max: u64) -> Result<(), RuntimeError> {
    let ms = value.as_millis();
    if ms < u128::from(min) || ms > u128::from(max) {
        return Err(RuntimeError::Config {
            key,
            reason: format!("{ms}ms is outside the valid range {min}..={max}ms"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn idle_sleep_range_bounds() {
        let mut cfg = Config::default();
        cfg.idle_sleep = Duration::from_millis(1);
        assert!(cfg.validate().is_ok());

        cfg.idle_sleep = Duration::from_millis(1000);
        cfg.tick_resolution = Duration::from_millis(1000);
        assert!(cfg.validate().is_ok());

        cfg.idle_sleep = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tick_resolution_must_cover_idle_sleep() {
        let mut cfg = Config::default();
        cfg.idle_sleep = Duration::from_millis(50);
        cfg.tick_resolution = Duration::from_millis(20);
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.as_label(), "runtime_config_invalid");
    }
}
