//! Immutable run configuration. The CLI parser fills one `Config` and all
//! one-shot sanity clamps happen in `validated`, so nothing downstream ever
//! mutates option state. Clamps that depend on negotiated device parameters
//! (target level vs. the real ring size, loop bandwidth vs. the real
//! timestep) are re-applied by the loopback driver.

use log::warn;

use crate::backend::SampleFormat;
use crate::resampler::Resampler;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WakeupMode {
    /// Periodic monotonic timer; cadence independent of device interrupts.
    Timer,
    /// Block on the capture device with a timeout.
    Wait,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub device_in: String,
    pub device_out: String,
    pub format_in: SampleFormat,
    pub format_out: SampleFormat,
    pub channels_in: u32,
    pub channels_out: u32,
    pub rate_in: u32,
    pub rate_out: u32,
    pub period_in: u32,
    pub period_out: u32,
    pub buffer_in: u32,
    pub buffer_out: u32,
    pub target_level: u32,
    pub timer_period: u64,
    pub loop_bandwidth: f32,
    pub initial_drift: f32,
    pub max_drift: f32,
    pub resampler_passband: f32,
    pub resampler_stopband: f32,
    pub resampler_beta: f32,
    pub resampler_gain: f32,
    pub wakeup_mode: WakeupMode,
    pub trace: bool,
    pub realtime_priority: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            device_in: String::new(),
            device_out: String::new(),
            format_in: SampleFormat::Any,
            format_out: SampleFormat::Any,
            channels_in: 2,
            channels_out: 2,
            rate_in: 48000,
            rate_out: 48000,
            period_in: 256,
            period_out: 256,
            buffer_in: 1024,
            buffer_out: 1024,
            target_level: 128,
            timer_period: 620_000,
            loop_bandwidth: 0.1,
            initial_drift: 0.0,
            max_drift: 0.002,
            resampler_passband: 0.42,
            resampler_stopband: 0.50,
            resampler_beta: 8.0,
            resampler_gain: 1.0,
            wakeup_mode: WakeupMode::Timer,
            trace: false,
            realtime_priority: 50,
        }
    }
}

fn check_range<T: PartialOrd + std::fmt::Display + Copy>(
    option: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if !(value >= min && value <= max) {
        return Err(Error::Config(format!(
            "value for option '{}' must be between {} and {}",
            option, min, max
        )));
    }
    Ok(())
}

impl Config {
    /// Checks option bounds and applies the one-shot clamps. Consumes and
    /// returns the configuration so the result is the only copy in use.
    pub fn validated(mut self) -> Result<Config> {
        check_range("--channels-in", self.channels_in, 1, 100)?;
        check_range("--channels-out", self.channels_out, 1, 100)?;
        check_range("--rate-in", self.rate_in, 1, 1_000_000)?;
        check_range("--rate-out", self.rate_out, 1, 1_000_000)?;
        check_range("--period-in", self.period_in, 1, 1_000_000)?;
        check_range("--period-out", self.period_out, 1, 1_000_000)?;
        check_range("--buffer-in", self.buffer_in, 1, 1_000_000)?;
        check_range("--buffer-out", self.buffer_out, 1, 1_000_000)?;
        check_range("--target-level", self.target_level, 1, 1_000_000)?;
        check_range("--timer-period", self.timer_period, 1_000, 100_000_000)?;
        check_range("--loop-bandwidth", self.loop_bandwidth, 1.0e-3, 10.0)?;
        check_range("--max-drift", self.max_drift, 0.0, 0.1)?;
        check_range(
            "--resampler-passband",
            self.resampler_passband,
            Resampler::PASSBAND_MIN,
            Resampler::PASSBAND_MAX,
        )?;
        check_range(
            "--resampler-stopband",
            self.resampler_stopband,
            Resampler::STOPBAND_MIN,
            Resampler::STOPBAND_MAX,
        )?;
        check_range(
            "--resampler-beta",
            self.resampler_beta,
            Resampler::BETA_MIN,
            Resampler::BETA_MAX,
        )?;
        check_range("--resampler-gain", self.resampler_gain, 0.0, 1.0e6)?;
        check_range("--realtime-priority", self.realtime_priority, 0, 99)?;
        if !self.initial_drift.is_finite() {
            return Err(Error::Config(
                "value for option '--initial-drift' must be finite".to_string(),
            ));
        }

        if self.channels_in != self.channels_out {
            return Err(Error::Config(
                "different number of input and output channels, channel remapping is not supported"
                    .to_string(),
            ));
        }

        let ratio = self.rate_in as f32 / self.rate_out as f32;
        if !(Resampler::RATIO_MIN..=Resampler::RATIO_MAX).contains(&ratio) {
            return Err(Error::Config(format!(
                "rate ratio {} is outside the supported range {} to {}",
                ratio,
                Resampler::RATIO_MIN,
                Resampler::RATIO_MAX
            )));
        }

        if self.target_level > self.buffer_out / 2 {
            self.target_level = self.buffer_out / 2;
            warn!(
                "target level reduced to {} to avoid overrun",
                self.target_level
            );
        }

        Ok(self)
    }

    /// Loopback and hardware test need both device names.
    pub fn require_devices(&self) -> Result<()> {
        if self.device_in.is_empty() {
            return Err(Error::Config("missing option: --device-in".to_string()));
        }
        if self.device_out.is_empty() {
            return Err(Error::Config("missing option: --device-out".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = Config::default().validated().unwrap();
        assert_eq!(cfg.target_level, 128);
    }

    #[test]
    fn channel_mismatch_is_rejected_before_any_device() {
        let cfg = Config {
            channels_in: 2,
            channels_out: 1,
            ..Config::default()
        };
        let err = cfg.validated().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("channel"));
    }

    #[test]
    fn target_level_is_clamped_to_half_the_ring() {
        let cfg = Config {
            target_level: 10_000,
            buffer_out: 1024,
            ..Config::default()
        };
        let cfg = cfg.validated().unwrap();
        assert_eq!(cfg.target_level, 512);
    }

    #[test]
    fn float_bounds_are_enforced() {
        let cfg = Config {
            loop_bandwidth: 50.0,
            ..Config::default()
        };
        assert!(cfg.validated().is_err());

        let cfg = Config {
            resampler_stopband: 0.3,
            ..Config::default()
        };
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn extreme_rate_ratio_is_a_config_error() {
        let cfg = Config {
            rate_in: 1_000_000,
            rate_out: 1,
            ..Config::default()
        };
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn missing_devices_reported() {
        let cfg = Config::default().validated().unwrap();
        let err = cfg.require_devices().unwrap_err();
        assert!(err.to_string().contains("--device-in"));
    }
}
