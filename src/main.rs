/*
 Copyright (c) 2026 the driftloop authors

 This file is part of driftloop

 driftloop is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 driftloop is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with driftloop. If not, see <https://www.gnu.org/licenses/>.
*/

use clap::Parser;

use driftloop::backend::SampleFormat;
use driftloop::backend_alsa::{AlsaCapture, AlsaPlayback};
use driftloop::config::WakeupMode;
use driftloop::logger::StderrLogger;
use driftloop::{analyze, loopback, priority, signals, Config, Result, TermResult};

#[derive(Parser)]
#[command(name = "driftloop", version, about = "Low-latency audio loopback with adaptive drift correction")]
struct Cli {
    /// Analyze the frequency response and accuracy of the resampler
    /// using the specified resampler parameters
    #[arg(long, conflicts_with = "test_hardware")]
    analyze_resampler: bool,

    /// Measure wakeup timing and device burst statistics instead of
    /// running the loopback
    #[arg(long)]
    test_hardware: bool,

    /// Capture device name
    #[arg(long, value_name = "NAME")]
    device_in: Option<String>,

    /// Playback device name
    #[arg(long, value_name = "NAME")]
    device_out: Option<String>,

    /// Capture sample format
    #[arg(long, value_enum, default_value = "any")]
    format_in: SampleFormat,

    /// Playback sample format
    #[arg(long, value_enum, default_value = "any")]
    format_out: SampleFormat,

    /// Number of capture channels
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..=100))]
    channels_in: u32,

    /// Number of playback channels (must match the capture side)
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..=100))]
    channels_out: u32,

    /// Capture sample rate in Hz
    #[arg(long, default_value_t = 48000, value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    rate_in: u32,

    /// Playback sample rate in Hz
    #[arg(long, default_value_t = 48000, value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    rate_out: u32,

    /// Capture period size in frames
    #[arg(long, default_value_t = 256, value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    period_in: u32,

    /// Playback period size in frames
    #[arg(long, default_value_t = 256, value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    period_out: u32,

    /// Capture ring buffer size in frames
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    buffer_in: u32,

    /// Playback ring buffer size in frames
    #[arg(long, default_value_t = 1024, value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    buffer_out: u32,

    /// Targeted playback buffer fill level in frames
    #[arg(long, default_value_t = 128, value_parser = clap::value_parser!(u32).range(1..=1_000_000))]
    target_level: u32,

    /// Timer period in nanoseconds (timer wakeup mode)
    #[arg(long, default_value_t = 620_000, value_parser = clap::value_parser!(u64).range(1_000..=100_000_000))]
    timer_period: u64,

    /// Bandwidth of the feedback loop in Hz
    #[arg(long, default_value_t = 0.1)]
    loop_bandwidth: f32,

    /// Initial clock drift estimate, e.g. from a previous run
    #[arg(long, default_value_t = 0.0)]
    initial_drift: f32,

    /// Maximum allowed clock drift
    #[arg(long, default_value_t = 0.002)]
    max_drift: f32,

    /// Resampler passband edge relative to the lower sample rate
    #[arg(long, default_value_t = 0.42)]
    resampler_passband: f32,

    /// Resampler stopband edge relative to the lower sample rate
    #[arg(long, default_value_t = 0.50)]
    resampler_stopband: f32,

    /// Kaiser window beta of the resampler
    #[arg(long, default_value_t = 8.0)]
    resampler_beta: f32,

    /// Linear output gain of the resampler
    #[arg(long, default_value_t = 1.0)]
    resampler_gain: f32,

    /// Wakeup source for the loopback iteration
    #[arg(long, value_enum, default_value = "timer")]
    wakeup_mode: WakeupMode,

    /// Print a trace line per iteration to standard output
    #[arg(long)]
    trace: bool,

    /// SCHED_RR priority for the loop thread; 0 disables elevation
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(0..=99))]
    realtime_priority: u32,

    /// Suppress informational messages
    #[arg(long)]
    quiet: bool,
}

fn main() -> TermResult {
    TermResult(run())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    StderrLogger::new(cli.quiet).init();
    signals::register();

    let config = Config {
        device_in: cli.device_in.unwrap_or_default(),
        device_out: cli.device_out.unwrap_or_default(),
        format_in: cli.format_in,
        format_out: cli.format_out,
        channels_in: cli.channels_in,
        channels_out: cli.channels_out,
        rate_in: cli.rate_in,
        rate_out: cli.rate_out,
        period_in: cli.period_in,
        period_out: cli.period_out,
        buffer_in: cli.buffer_in,
        buffer_out: cli.buffer_out,
        target_level: cli.target_level,
        timer_period: cli.timer_period,
        loop_bandwidth: cli.loop_bandwidth,
        initial_drift: cli.initial_drift,
        max_drift: cli.max_drift,
        resampler_passband: cli.resampler_passband,
        resampler_stopband: cli.resampler_stopband,
        resampler_beta: cli.resampler_beta,
        resampler_gain: cli.resampler_gain,
        wakeup_mode: cli.wakeup_mode,
        trace: cli.trace,
        realtime_priority: cli.realtime_priority,
    }
    .validated()?;

    if cli.analyze_resampler {
        analyze::run(&config);
        return Ok(());
    }

    config.require_devices()?;
    priority::set_realtime_priority(config.realtime_priority);
    priority::set_memory_lock();

    let capture = AlsaCapture::open(
        &config.device_in,
        config.format_in,
        config.channels_in,
        config.rate_in,
        config.period_in,
        config.buffer_in,
    )?;
    let playback = AlsaPlayback::open(
        &config.device_out,
        config.format_out,
        config.channels_out,
        config.rate_out,
        config.period_out,
        config.buffer_out,
    )?;

    if cli.test_hardware {
        loopback::test_hardware(&config, capture, playback)
    } else {
        loopback::run_loopback(&config, capture, playback)
    }
}
