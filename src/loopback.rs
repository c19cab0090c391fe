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

//! The loopback driver: capture -> resample -> playback, with the loop
//! filter steering the resampling ratio from the observed playback fill
//! level. One wakeup per iteration (periodic timer or capture wait), all
//! buffers preallocated up front, nothing blocks except the wakeup itself.

use log::{info, warn};

use crate::backend::{Capture, Playback};
use crate::config::{Config, WakeupMode};
use crate::control::LoopFilter;
use crate::math::sqr;
use crate::resampler::Resampler;
use crate::signals;
use crate::timer::PeriodicTimer;
use crate::{Error, Result};

/// Capture wait timeout in wait mode.
const WAIT_TIMEOUT_MS: u32 = 100;

fn monotonic_time_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

enum Wakeup {
    Timer(PeriodicTimer),
    Wait,
}

impl Wakeup {
    fn new(config: &Config) -> Result<Wakeup> {
        match config.wakeup_mode {
            WakeupMode::Timer => {
                let mut timer = PeriodicTimer::new()?;
                timer.start(config.timer_period)?;
                Ok(Wakeup::Timer(timer))
            }
            WakeupMode::Wait => Ok(Wakeup::Wait),
        }
    }

    /// Suspends until the next iteration is due. Returns false when the
    /// wakeup was anomalous (missed timer periods or a capture timeout).
    fn wait<C: Capture>(&mut self, capture: &mut C) -> Result<bool> {
        match self {
            Wakeup::Timer(timer) => Ok(timer.wait()? == 1),
            Wakeup::Wait => capture.wait(WAIT_TIMEOUT_MS),
        }
    }
}

pub fn run_loopback<C: Capture, P: Playback>(
    config: &Config,
    mut capture: C,
    mut playback: P,
) -> Result<()> {
    let in_params = capture.params();
    let out_params = playback.params();

    // the negotiated values are what counts from here on
    if in_params.channels != out_params.channels {
        return Err(Error::Device(
            "different number of input and output channels, channel remapping is not supported"
                .to_string(),
        ));
    }
    let channels = in_params.channels as usize;

    let mut target_level = config.target_level;
    if target_level > out_params.buffer / 2 {
        target_level = out_params.buffer / 2;
        warn!("target level reduced to {} to avoid overrun", target_level);
    }

    let nominal_ratio = in_params.rate as f32 / out_params.rate as f32;
    if !(Resampler::RATIO_MIN..=Resampler::RATIO_MAX).contains(&nominal_ratio) {
        return Err(Error::Config(format!(
            "rate ratio {} is outside the supported range",
            nominal_ratio
        )));
    }

    let mut resampler = Resampler::new(
        nominal_ratio,
        config.resampler_passband,
        config.resampler_stopband,
        config.resampler_beta,
        config.resampler_gain,
    );
    let length = resampler.get_filter_length() as usize;

    // loop filter timestep: the timer period, or in wait mode the shorter of
    // the wait timeout and one capture period
    let timestep = match config.wakeup_mode {
        WakeupMode::Timer => config.timer_period as f32 * 1.0e-9,
        WakeupMode::Wait => {
            (WAIT_TIMEOUT_MS as f32 * 1.0e-3).min(in_params.period as f32 / in_params.rate as f32)
        }
    };
    let mut loop_filter = LoopFilter::new(
        config.loop_bandwidth,
        timestep,
        config.max_drift,
        config.initial_drift,
    );

    // preallocate everything the steady-state loop touches: per channel a
    // backlog of one filter length plus one capture burst, and output
    // scratch for the largest burst a lowered ratio can produce
    let input_size = length + in_params.buffer as usize;
    let output_size =
        (in_params.buffer as u64 * (3 * out_params.rate as u64) / (2 * in_params.rate as u64))
            as usize
            + 4;
    let mut input_data: Vec<Vec<f32>> = vec![vec![0.0; input_size]; channels];
    let mut output_data: Vec<Vec<f32>> = vec![vec![0.0; output_size]; channels];
    let mut resampler_pos = 0usize;

    // prefill the playback ring
    let warmup_level = (target_level as usize) * 5 / 4;
    if playback.write(None, warmup_level)? != warmup_level {
        warn!("could not fill output buffer");
    }

    capture.start()?;
    playback.start()?;
    let mut wakeup = Wakeup::new(config)?;

    // warmup: keep playback topped up with silence and discard input until
    // either direction has streamed four ring buffers worth of samples
    info!("starting warmup");
    let mut warmup_input = 0usize;
    let mut warmup_output = 0usize;
    while warmup_input < 4 * in_params.buffer as usize
        && warmup_output < 4 * out_params.buffer as usize
    {
        if signals::interrupted() {
            return Ok(());
        }
        wakeup.wait(&mut capture)?;
        if !capture.running() {
            return Err(Error::Device("capture stopped unexpectedly".to_string()));
        }
        if !playback.running() {
            return Err(Error::Device("playback stopped unexpectedly".to_string()));
        }
        warmup_input += capture.read(None, in_params.buffer as usize)?;
        let buffer_used = playback.buffer_used()?;
        if buffer_used < warmup_level {
            warmup_output += playback.write(None, warmup_level - buffer_used)?;
        }
    }

    info!("starting loopback");
    let mut anomalies = 0u64;
    while !signals::interrupted() {
        if !wakeup.wait(&mut capture)? {
            anomalies += 1;
        }

        if !capture.running() {
            return Err(Error::Device("capture stopped unexpectedly".to_string()));
        }
        if !playback.running() {
            return Err(Error::Device("playback stopped unexpectedly".to_string()));
        }

        // pull a burst into the backlog behind the carried-over history
        let input_samples =
            capture.read(Some((&mut input_data, length)), in_params.buffer as usize)?;
        let mut output_samples = 0usize;
        if input_samples != 0 {
            if resampler_pos < length + input_samples {
                resampler.set_ratio(nominal_ratio / (1.0 + loop_filter.correction()));
                let (consumed, produced) = resampler.resample(
                    &input_data,
                    resampler_pos,
                    length + input_samples - resampler_pos,
                    &mut output_data,
                    output_size,
                );
                output_samples = produced;
                resampler_pos += consumed;
            }

            // move the newest filter length of samples to the front so the
            // next burst lands right behind it
            for channel in input_data.iter_mut() {
                channel.copy_within(input_samples..input_samples + length, 0);
            }
            if input_samples > resampler_pos {
                warn!("could not resample all samples");
                resampler_pos = 0;
            } else {
                resampler_pos -= input_samples;
            }

            if playback.write(Some(&output_data), output_samples)? != output_samples {
                warn!("could not write all samples");
            }
        }

        // the fill level observed after this write steers the next iteration
        let buffer_used = playback.buffer_used()?;
        let error = (target_level as i64 - buffer_used as i64) as f32 / out_params.rate as f32;
        loop_filter.update(error);

        if config.trace {
            println!(
                "{} {} {} {} {:e} {:e}",
                monotonic_time_ns(),
                input_samples,
                output_samples,
                buffer_used,
                loop_filter.drift(),
                loop_filter.correction()
            );
        }
    }

    if anomalies != 0 {
        info!("{} wakeup anomalies during this run", anomalies);
    }
    info!(
        "suggested option for the next run: --initial-drift={:e}",
        loop_filter.drift()
    );
    Ok(())
}

/// Timing testbed: runs the wakeup loop against both devices without any
/// resampling and prints 5-second batches of statistics, including a
/// drift-compensated jitter estimate per direction.
pub fn test_hardware<C: Capture, P: Playback>(
    config: &Config,
    mut capture: C,
    mut playback: P,
) -> Result<()> {
    let in_params = capture.params();
    let out_params = playback.params();

    if playback.write(None, out_params.buffer as usize)? != out_params.buffer as usize {
        warn!("could not fill output buffer");
    }

    capture.start()?;
    playback.start()?;

    let mut timer = PeriodicTimer::new()?;
    timer.start(config.timer_period)?;
    let mut last_time = monotonic_time_ns();

    loop {
        let mut timer_expired = 0u32;
        let mut timer_early = 0u32;
        let mut timer_late = 0u32;
        let mut input_blocks = 0u32;
        let (mut min_input, mut max_input) = (0u32, 0u32);
        let (mut sum_input, mut sumsqr_input) = (0u64, 0u64);
        let mut output_blocks = 0u32;
        let (mut min_output, mut max_output) = (0u32, 0u32);
        let (mut sum_output, mut sumsqr_output) = (0u64, 0u64);
        let (mut input_m1, mut input_m2, mut input_m3) = (0i64, 0i64, 0i64);
        let (mut output_m1, mut output_m2, mut output_m3) = (0i64, 0i64, 0i64);

        let start_time = last_time;
        let loops = (5_000_000_000u64 / config.timer_period) as u32;
        for current_loop in 0..loops {
            if signals::interrupted() {
                return Ok(());
            }

            let expired = timer.wait()?;
            let current_time = monotonic_time_ns();

            if expired != 1 {
                timer_expired += 1;
            }
            if current_time < last_time + config.timer_period * 3 / 4 {
                timer_early += 1;
            }
            if current_time > last_time + config.timer_period * 5 / 4 {
                timer_late += 1;
            }
            last_time = current_time;

            if !capture.running() {
                return Err(Error::Device("capture stopped unexpectedly".to_string()));
            }
            if !playback.running() {
                return Err(Error::Device("playback stopped unexpectedly".to_string()));
            }

            let input_samples = capture.read(None, in_params.buffer as usize)? as u32;
            if input_samples != 0 {
                if input_samples < min_input || input_blocks == 0 {
                    min_input = input_samples;
                }
                max_input = max_input.max(input_samples);
                sum_input += input_samples as u64;
                sumsqr_input += (input_samples as u64) * (input_samples as u64);
                input_blocks += 1;
            }

            let output_samples = playback.write(None, out_params.buffer as usize)? as u32;
            if output_samples != 0 {
                if output_samples < min_output || output_blocks == 0 {
                    min_output = output_samples;
                }
                max_output = max_output.max(output_samples);
                sum_output += output_samples as u64;
                sumsqr_output += (output_samples as u64) * (output_samples as u64);
                output_blocks += 1;
            }

            // sample-count offset against the wall clock, accumulated as
            // raw moments for the drift-compensated jitter estimate
            let elapsed = current_time - start_time;
            let input_offset =
                sum_input as i64 - (elapsed * in_params.rate as u64 / 1_000_000_000) as i64;
            input_m1 += input_offset;
            input_m2 += input_offset * current_loop as i64;
            input_m3 += input_offset * input_offset;
            let output_offset =
                sum_output as i64 - (elapsed * out_params.rate as u64 / 1_000_000_000) as i64;
            output_m1 += output_offset;
            output_m2 += output_offset * current_loop as i64;
            output_m3 += output_offset * output_offset;
        }

        let avg_in = sum_input as f64 / input_blocks.max(1) as f64;
        let std_in = (sumsqr_input as f64 / input_blocks.max(1) as f64 - sqr(avg_in)).max(0.0).sqrt();
        let avg_out = sum_output as f64 / output_blocks.max(1) as f64;
        let std_out =
            (sumsqr_output as f64 / output_blocks.max(1) as f64 - sqr(avg_out)).max(0.0).sqrt();

        let loops_f = loops as f64;
        let in_m1 = input_m1 as f64 / loops_f;
        let in_m2 = (input_m2 as f64 + 0.5 * input_m1 as f64) / sqr(loops_f);
        let in_m3 = input_m3 as f64 / loops_f;
        let input_jitter =
            (in_m3 - 4.0 * sqr(in_m1) - 12.0 * sqr(in_m2) + 12.0 * in_m1 * in_m2).max(0.0).sqrt();
        let out_m1 = output_m1 as f64 / loops_f;
        let out_m2 = (output_m2 as f64 + 0.5 * output_m1 as f64) / sqr(loops_f);
        let out_m3 = output_m3 as f64 / loops_f;
        let output_jitter =
            (out_m3 - 4.0 * sqr(out_m1) - 12.0 * sqr(out_m2) + 12.0 * out_m1 * out_m2).max(0.0).sqrt();

        println!(
            "Stats: expired={} early={} late={} blocks_in={} min_in={} max_in={} avg_in={:.2} \
             std_in={:.2} blocks_out={} min_out={} max_out={} avg_out={:.2} std_out={:.2} \
             jitter_in={:.2} jitter_out={:.2}",
            timer_expired,
            timer_early,
            timer_late,
            input_blocks,
            min_input,
            max_input,
            avg_in,
            std_in,
            output_blocks,
            min_output,
            max_output,
            avg_out,
            std_out,
            input_jitter,
            output_jitter
        );
    }
}
