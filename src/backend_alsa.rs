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

//! ALSA implementation of the capture/playback traits. Non-blocking PCMs,
//! interleaved access, start/stop thresholds pushed to the ring boundary so
//! the device never starts or stops behind our back, and silence installed
//! for playback underruns. Sample conversion happens in a preallocated
//! interleaved staging buffer.

use alsa::pcm::{Access, Format, Frames, HwParams, PCM};
use alsa::{Direction, ValueOr};
use log::{info, warn};

use crate::backend::{Capture, DeviceParams, Playback, SampleFormat};
use crate::convert;
use crate::{Error, Result};

enum Staging {
    F32(Vec<f32>),
    I32(Vec<i32>),
    I16(Vec<i16>),
}

struct AlsaPcm {
    pcm: PCM,
    direction: Direction,
    name: String,
    params: DeviceParams,
    staging: Staging,
    running: bool,
}

fn native_format(format: SampleFormat) -> Format {
    match format {
        SampleFormat::F32 => Format::float(),
        SampleFormat::S32 => Format::s32(),
        SampleFormat::S24 => Format::s24(),
        SampleFormat::S16 => Format::s16(),
        SampleFormat::Any => unreachable!("format preference must be resolved first"),
    }
}

impl AlsaPcm {
    fn open(
        direction: Direction,
        name: &str,
        format: SampleFormat,
        channels: u32,
        rate: u32,
        period: u32,
        buffer: u32,
    ) -> Result<AlsaPcm> {
        let dev = |what: &str| Error::Device(format!("failed to {} of ALSA PCM '{}'", what, name));

        let pcm = PCM::new(name, direction, true)
            .map_err(|err| Error::Device(format!("failed to open ALSA PCM '{}': {}", name, err)))?;

        let effective_format;
        let params;
        {
            let hwp = HwParams::any(&pcm).map_err(|_| dev("get hardware parameters"))?;
            hwp.set_access(Access::RWInterleaved)
                .map_err(|_| dev("set access type"))?;

            // resolve the format preference against what the hardware takes
            effective_format = match format {
                SampleFormat::Any => [
                    SampleFormat::F32,
                    SampleFormat::S32,
                    SampleFormat::S24,
                    SampleFormat::S16,
                ]
                .into_iter()
                .find(|&f| hwp.test_format(native_format(f)).is_ok())
                .ok_or_else(|| dev("find a supported sample format"))?,
                other => other,
            };
            hwp.set_format(native_format(effective_format))
                .map_err(|_| dev("set sample format"))?;

            hwp.set_channels(channels)
                .map_err(|_| dev("set channel count"))?;
            hwp.set_rate_resample(false)
                .map_err(|_| dev("disable resampling"))?;
            hwp.set_rate(rate, ValueOr::Nearest)
                .map_err(|_| dev("set sample rate"))?;
            hwp.set_period_size_near(period as Frames, ValueOr::Nearest)
                .map_err(|_| dev("set period size"))?;
            hwp.set_buffer_size_near(buffer as Frames)
                .map_err(|_| dev("set buffer size"))?;
            pcm.hw_params(&hwp)
                .map_err(|_| dev("apply hardware parameters"))?;

            params = DeviceParams {
                format: effective_format,
                channels: hwp.get_channels().map_err(|_| dev("get channel count"))?,
                rate: hwp.get_rate().map_err(|_| dev("get sample rate"))?,
                period: hwp.get_period_size().map_err(|_| dev("get period size"))? as u32,
                buffer: hwp.get_buffer_size().map_err(|_| dev("get buffer size"))? as u32,
            };
        }

        {
            let swp = pcm
                .sw_params_current()
                .map_err(|_| dev("get software parameters"))?;
            let boundary = swp.get_boundary().map_err(|_| dev("get boundary"))?;
            // the device only ever starts and stops on our explicit request
            swp.set_start_threshold(boundary)
                .map_err(|_| dev("set start threshold"))?;
            swp.set_stop_threshold(boundary)
                .map_err(|_| dev("set stop threshold"))?;
            swp.set_avail_min(1).map_err(|_| dev("set minimum available frames"))?;
            // underruns play silence instead of stale ring contents
            swp.set_silence_threshold(0)
                .map_err(|_| dev("set silence threshold"))?;
            swp.set_silence_size(boundary)
                .map_err(|_| dev("set silence size"))?;
            pcm.sw_params(&swp)
                .map_err(|_| dev("apply software parameters"))?;
        }

        pcm.prepare().map_err(|_| dev("prepare"))?;

        let samples = (params.channels * params.buffer) as usize;
        let staging = match effective_format {
            SampleFormat::F32 => Staging::F32(vec![0.0; samples]),
            SampleFormat::S32 | SampleFormat::S24 => Staging::I32(vec![0; samples]),
            SampleFormat::S16 => Staging::I16(vec![0; samples]),
            SampleFormat::Any => unreachable!(),
        };

        let direction_name = match direction {
            Direction::Capture => "capture",
            Direction::Playback => "playback",
        };
        info!("ALSA PCM '{}' direction={} {}", name, direction_name, params);

        Ok(AlsaPcm {
            pcm,
            direction,
            name: name.to_string(),
            params,
            staging,
            running: false,
        })
    }

    fn start(&mut self) -> Result<()> {
        self.pcm.start().map_err(|err| {
            Error::Device(format!("failed to start ALSA PCM '{}': {}", self.name, err))
        })?;
        self.running = true;
        match self.direction {
            Direction::Capture => info!("capture PCM started"),
            Direction::Playback => info!("playback PCM started"),
        }
        Ok(())
    }

    /// Re-prepares and restarts after an xrun. Failure here is fatal.
    fn recover(&mut self) -> Result<()> {
        match self.direction {
            Direction::Capture => warn!("overrun in ALSA capture"),
            Direction::Playback => warn!("underrun in ALSA playback"),
        }
        self.pcm.prepare().map_err(|_| {
            Error::Device(format!("failed to recover ALSA PCM '{}' after xrun", self.name))
        })?;
        self.pcm.start().map_err(|_| {
            Error::Device(format!("failed to restart ALSA PCM '{}' after xrun", self.name))
        })?;
        Ok(())
    }

    fn wait(&mut self, timeout_ms: u32) -> Result<bool> {
        match self.pcm.wait(Some(timeout_ms)) {
            Ok(ready) => Ok(ready),
            Err(err) if err.errno() == libc::EPIPE => {
                self.recover()?;
                Ok(false)
            }
            Err(err) => Err(Error::Device(format!(
                "failed to wait on ALSA PCM '{}': {}",
                self.name, err
            ))),
        }
    }

    fn read(&mut self, dest: Option<(&mut [Vec<f32>], usize)>, frames: usize) -> Result<usize> {
        let size = frames.min(self.params.buffer as usize);
        let channels = self.params.channels as usize;

        let read = match &mut self.staging {
            Staging::F32(buf) => self.pcm.io_checked().and_then(|io| io.readi(&mut buf[..size * channels])),
            Staging::I32(buf) => self.pcm.io_checked().and_then(|io| io.readi(&mut buf[..size * channels])),
            Staging::I16(buf) => self.pcm.io_checked().and_then(|io| io.readi(&mut buf[..size * channels])),
        };
        let frames_read = match read {
            Ok(n) => n,
            Err(err) if err.errno() == libc::EPIPE => {
                self.recover()?;
                return Ok(0);
            }
            Err(err) if err.errno() == libc::EAGAIN => return Ok(0),
            Err(err) => {
                return Err(Error::Device(format!(
                    "failed to read from ALSA PCM '{}': {}",
                    self.name, err
                )))
            }
        };

        if let Some((dest, offset)) = dest {
            match (&self.staging, self.params.format) {
                (Staging::F32(buf), _) => {
                    for i in 0..frames_read {
                        for (ch, out) in dest.iter_mut().enumerate() {
                            out[offset + i] = buf[i * channels + ch];
                        }
                    }
                }
                (Staging::I32(buf), SampleFormat::S32) => {
                    for i in 0..frames_read {
                        for (ch, out) in dest.iter_mut().enumerate() {
                            out[offset + i] = convert::s32_to_f32(buf[i * channels + ch]);
                        }
                    }
                }
                (Staging::I32(buf), _) => {
                    for i in 0..frames_read {
                        for (ch, out) in dest.iter_mut().enumerate() {
                            out[offset + i] = convert::s24_to_f32(buf[i * channels + ch]);
                        }
                    }
                }
                (Staging::I16(buf), _) => {
                    for i in 0..frames_read {
                        for (ch, out) in dest.iter_mut().enumerate() {
                            out[offset + i] = convert::s16_to_f32(buf[i * channels + ch]);
                        }
                    }
                }
            }
        }

        Ok(frames_read)
    }

    fn write(&mut self, src: Option<&[Vec<f32>]>, frames: usize) -> Result<usize> {
        let size = frames.min(self.params.buffer as usize);
        let channels = self.params.channels as usize;

        match (&mut self.staging, src) {
            (Staging::F32(buf), None) => buf[..size * channels].fill(0.0),
            (Staging::I32(buf), None) => buf[..size * channels].fill(0),
            (Staging::I16(buf), None) => buf[..size * channels].fill(0),
            (Staging::F32(buf), Some(src)) => {
                for i in 0..size {
                    for (ch, input) in src.iter().enumerate() {
                        buf[i * channels + ch] = input[i];
                    }
                }
            }
            (Staging::I32(buf), Some(src)) => {
                let to_native: fn(f32) -> i32 = if self.params.format == SampleFormat::S32 {
                    convert::f32_to_s32
                } else {
                    convert::f32_to_s24
                };
                for i in 0..size {
                    for (ch, input) in src.iter().enumerate() {
                        buf[i * channels + ch] = to_native(input[i]);
                    }
                }
            }
            (Staging::I16(buf), Some(src)) => {
                for i in 0..size {
                    for (ch, input) in src.iter().enumerate() {
                        buf[i * channels + ch] = convert::f32_to_s16(input[i]);
                    }
                }
            }
        }

        let written = match &self.staging {
            Staging::F32(buf) => self.pcm.io_checked().and_then(|io| io.writei(&buf[..size * channels])),
            Staging::I32(buf) => self.pcm.io_checked().and_then(|io| io.writei(&buf[..size * channels])),
            Staging::I16(buf) => self.pcm.io_checked().and_then(|io| io.writei(&buf[..size * channels])),
        };
        match written {
            Ok(n) => Ok(n),
            Err(err) if err.errno() == libc::EPIPE => {
                self.recover()?;
                Ok(0)
            }
            Err(err) if err.errno() == libc::EAGAIN => Ok(0),
            Err(err) => Err(Error::Device(format!(
                "failed to write to ALSA PCM '{}': {}",
                self.name, err
            ))),
        }
    }

    fn avail(&mut self) -> Result<usize> {
        match self.pcm.avail() {
            Ok(frames) => Ok((frames.max(0) as usize).min(self.params.buffer as usize)),
            Err(err) if err.errno() == libc::EPIPE => {
                self.recover()?;
                Ok(0)
            }
            Err(err) => Err(Error::Device(format!(
                "failed to get available frames of ALSA PCM '{}': {}",
                self.name, err
            ))),
        }
    }
}

pub struct AlsaCapture {
    dev: AlsaPcm,
}

impl AlsaCapture {
    pub fn open(
        name: &str,
        format: SampleFormat,
        channels: u32,
        rate: u32,
        period: u32,
        buffer: u32,
    ) -> Result<AlsaCapture> {
        Ok(AlsaCapture {
            dev: AlsaPcm::open(Direction::Capture, name, format, channels, rate, period, buffer)?,
        })
    }
}

impl Capture for AlsaCapture {
    fn start(&mut self) -> Result<()> {
        self.dev.start()
    }

    fn running(&self) -> bool {
        self.dev.running
    }

    fn wait(&mut self, timeout_ms: u32) -> Result<bool> {
        self.dev.wait(timeout_ms)
    }

    fn read(&mut self, dest: Option<(&mut [Vec<f32>], usize)>, frames: usize) -> Result<usize> {
        self.dev.read(dest, frames)
    }

    fn buffer_used(&mut self) -> Result<usize> {
        self.dev.avail()
    }

    fn buffer_free(&mut self) -> Result<usize> {
        let used = self.dev.avail()?;
        Ok(self.dev.params.buffer as usize - used)
    }

    fn params(&self) -> DeviceParams {
        self.dev.params
    }
}

pub struct AlsaPlayback {
    dev: AlsaPcm,
}

impl AlsaPlayback {
    pub fn open(
        name: &str,
        format: SampleFormat,
        channels: u32,
        rate: u32,
        period: u32,
        buffer: u32,
    ) -> Result<AlsaPlayback> {
        Ok(AlsaPlayback {
            dev: AlsaPcm::open(Direction::Playback, name, format, channels, rate, period, buffer)?,
        })
    }
}

impl Playback for AlsaPlayback {
    fn start(&mut self) -> Result<()> {
        self.dev.start()
    }

    fn running(&self) -> bool {
        self.dev.running
    }

    fn write(&mut self, src: Option<&[Vec<f32>]>, frames: usize) -> Result<usize> {
        self.dev.write(src, frames)
    }

    fn buffer_used(&mut self) -> Result<usize> {
        let free = self.dev.avail()?;
        Ok(self.dev.params.buffer as usize - free)
    }

    fn buffer_free(&mut self) -> Result<usize> {
        self.dev.avail()
    }

    fn params(&self) -> DeviceParams {
        self.dev.params
    }
}
