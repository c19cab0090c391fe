//! Runs the real loopback driver against simulated devices in wait mode:
//! the capture clock is slightly fast, wakeups happen instantly, and the
//! driver has to warm up, stream, hold the fill level, and shut down
//! cleanly when asked to stop.

use std::cell::RefCell;
use std::rc::Rc;

use driftloop::backend::{Capture, DeviceParams, Playback, SampleFormat};
use driftloop::config::WakeupMode;
use driftloop::loopback::run_loopback;
use driftloop::{signals, Config, Result};

const RATE_IN_TRUE: f64 = 48000.5;
const RATE_OUT_TRUE: f64 = 48000.0;
/// Simulated time that passes per capture wait (one capture period).
const STEP: f64 = 256.0 / 48000.0;

struct SimClock {
    now: f64,
}

struct SimCapture {
    clock: Rc<RefCell<SimClock>>,
    params: DeviceParams,
    running: bool,
    avail: f64,
    waits: usize,
    max_waits: usize,
    phase: f64,
}

impl Capture for SimCapture {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn running(&self) -> bool {
        self.running
    }

    fn wait(&mut self, _timeout_ms: u32) -> Result<bool> {
        self.clock.borrow_mut().now += STEP;
        self.avail += RATE_IN_TRUE * STEP;
        self.waits += 1;
        if self.waits >= self.max_waits {
            signals::request_stop();
        }
        Ok(true)
    }

    fn read(&mut self, dest: Option<(&mut [Vec<f32>], usize)>, frames: usize) -> Result<usize> {
        let count = (self.avail.floor() as usize).min(frames);
        self.avail -= count as f64;
        if let Some((dest, offset)) = dest {
            for i in 0..count {
                self.phase += 2.0 * std::f64::consts::PI * 440.0 / RATE_IN_TRUE;
                let sample = (0.25 * self.phase.sin()) as f32;
                for channel in dest.iter_mut() {
                    channel[offset + i] = sample;
                }
            }
        }
        Ok(count)
    }

    fn buffer_used(&mut self) -> Result<usize> {
        Ok(self.avail.floor() as usize)
    }

    fn buffer_free(&mut self) -> Result<usize> {
        Ok(self.params.buffer as usize - self.avail.floor() as usize)
    }

    fn params(&self) -> DeviceParams {
        self.params
    }
}

struct SimPlayback {
    clock: Rc<RefCell<SimClock>>,
    params: DeviceParams,
    running: bool,
    filled: f64,
    drained_until: f64,
    total_written: u64,
    late_underruns: u32,
    saw_signal: bool,
}

impl SimPlayback {
    fn drain(&mut self) {
        let now = self.clock.borrow().now;
        if self.running && now > self.drained_until {
            self.filled -= (now - self.drained_until) * RATE_OUT_TRUE;
            if self.filled < 0.0 {
                self.filled = 0.0;
                // ignore the warmup transient; the settled loop must never
                // starve the ring
                if now > 20.0 {
                    self.late_underruns += 1;
                }
            }
        }
        self.drained_until = now;
    }
}

impl Playback for SimPlayback {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.drained_until = self.clock.borrow().now;
        Ok(())
    }

    fn running(&self) -> bool {
        self.running
    }

    fn write(&mut self, src: Option<&[Vec<f32>]>, frames: usize) -> Result<usize> {
        self.drain();
        let free = self.params.buffer as usize - self.filled.floor() as usize;
        let accepted = frames.min(free);
        self.filled += accepted as f64;
        self.total_written += accepted as u64;
        if let Some(src) = src {
            if src[0][..accepted].iter().any(|&x| x.abs() > 0.01) {
                self.saw_signal = true;
            }
        }
        Ok(accepted)
    }

    fn buffer_used(&mut self) -> Result<usize> {
        self.drain();
        Ok(self.filled.floor() as usize)
    }

    fn buffer_free(&mut self) -> Result<usize> {
        self.drain();
        Ok(self.params.buffer as usize - self.filled.floor() as usize)
    }

    fn params(&self) -> DeviceParams {
        self.params
    }
}

#[test]
fn driver_streams_and_holds_the_target_level() {
    signals::reset();

    let params = DeviceParams {
        format: SampleFormat::F32,
        channels: 2,
        rate: 48000,
        period: 256,
        buffer: 1024,
    };
    let clock = Rc::new(RefCell::new(SimClock { now: 0.0 }));
    // 40 simulated seconds
    let max_waits = (40.0 / STEP) as usize;
    let capture = SimCapture {
        clock: clock.clone(),
        params,
        running: false,
        avail: 0.0,
        waits: 0,
        max_waits,
        phase: 0.0,
    };
    let playback = SimPlayback {
        clock: clock.clone(),
        params,
        running: false,
        filled: 0.0,
        drained_until: 0.0,
        total_written: 0,
        late_underruns: 0,
        saw_signal: false,
    };

    let config = Config {
        wakeup_mode: WakeupMode::Wait,
        device_in: "sim-in".to_string(),
        device_out: "sim-out".to_string(),
        ..Config::default()
    }
    .validated()
    .unwrap();

    // run_loopback consumes the devices, so observe through shared handles
    let playback = Rc::new(RefCell::new(playback));
    struct PlaybackHandle(Rc<RefCell<SimPlayback>>);
    impl Playback for PlaybackHandle {
        fn start(&mut self) -> Result<()> {
            self.0.borrow_mut().start()
        }
        fn running(&self) -> bool {
            self.0.borrow().running
        }
        fn write(&mut self, src: Option<&[Vec<f32>]>, frames: usize) -> Result<usize> {
            self.0.borrow_mut().write(src, frames)
        }
        fn buffer_used(&mut self) -> Result<usize> {
            self.0.borrow_mut().buffer_used()
        }
        fn buffer_free(&mut self) -> Result<usize> {
            self.0.borrow_mut().buffer_free()
        }
        fn params(&self) -> DeviceParams {
            self.0.borrow().params()
        }
    }

    run_loopback(&config, capture, PlaybackHandle(playback.clone())).unwrap();

    let playback = playback.borrow();
    // the run streamed real audio for tens of seconds
    assert!(playback.saw_signal, "no signal reached the playback side");
    assert!(
        playback.total_written as f64 > 30.0 * RATE_OUT_TRUE,
        "only {} frames written",
        playback.total_written
    );
    // and parked the fill level at the target
    let final_level = playback.filled;
    assert!(
        (final_level - 128.0).abs() <= 32.0,
        "final fill level {}",
        final_level
    );
    assert_eq!(playback.late_underruns, 0, "underruns after settling");
}
