//! Device-facing surface of the loopback: sample formats, negotiated
//! parameters, and the capture/playback traits the driver runs against.
//! The ALSA implementation lives in `backend_alsa`; tests substitute
//! simulated devices.

use core::fmt;

use crate::Result;

/// Sample format preference for `open`. With `Any` the backend picks the
/// best format the hardware accepts, preferring f32 > s32 > s24 > s16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SampleFormat {
    Any,
    F32,
    S32,
    S24,
    S16,
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::Any => "any",
            SampleFormat::F32 => "f32",
            SampleFormat::S32 => "s32",
            SampleFormat::S24 => "s24",
            SampleFormat::S16 => "s16",
        };
        write!(f, "{}", name)
    }
}

/// Effective parameters after hardware negotiation. Clients must use these,
/// not the values they asked for.
#[derive(Debug, Clone, Copy)]
pub struct DeviceParams {
    pub format: SampleFormat,
    pub channels: u32,
    pub rate: u32,
    pub period: u32,
    pub buffer: u32,
}

impl fmt::Display for DeviceParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "format={} channels={} rate={} period={} buffer={}",
            self.format, self.channels, self.rate, self.period, self.buffer
        )
    }
}

/// Capture side of a sound device.
///
/// All calls are non-blocking except `wait`. Transient xruns are recovered
/// internally (warning + re-prepare + restart) and show up only as zero
/// progress; an `Err` means the device is beyond recovery.
pub trait Capture {
    fn start(&mut self) -> Result<()>;

    fn running(&self) -> bool;

    /// Blocks until frames are available or `timeout_ms` elapsed. Returns
    /// false on timeout or when an overrun had to be recovered.
    fn wait(&mut self, timeout_ms: u32) -> Result<bool>;

    /// Reads up to `frames` frames, deinterleaved into normalized floats at
    /// `dest[channel][offset..]`. `None` discards the data. Returns the
    /// number of frames read; 0 also covers EAGAIN and recovered overruns.
    fn read(&mut self, dest: Option<(&mut [Vec<f32>], usize)>, frames: usize) -> Result<usize>;

    fn buffer_used(&mut self) -> Result<usize>;

    fn buffer_free(&mut self) -> Result<usize>;

    fn params(&self) -> DeviceParams;
}

/// Playback side of a sound device.
pub trait Playback {
    fn start(&mut self) -> Result<()>;

    fn running(&self) -> bool;

    /// Writes up to `frames` frames from `src[channel][0..frames]`,
    /// interleaving and converting to the native format. `None` writes
    /// silence. Returns the number of frames written; 0 also covers EAGAIN
    /// and recovered underruns.
    fn write(&mut self, src: Option<&[Vec<f32>]>, frames: usize) -> Result<usize>;

    fn buffer_used(&mut self) -> Result<usize>;

    fn buffer_free(&mut self) -> Result<usize>;

    fn params(&self) -> DeviceParams;
}
