//! Drift tracking loop filter.
//!
//! The playback fill-level error drives a PI controller whose output is
//! smoothed by two cascaded one-pole lowpasses; the result is the fractional
//! rate correction applied on top of the nominal resampling ratio. The
//! integrator tracks the long-term clock drift, which is almost DC, so the
//! usable bandwidth is very low (0.1 Hz by default). During the first
//! moments after warmup the proportional and lowpass gains are temporarily
//! widened to the stability limit so the startup transient dies quickly.

use log::warn;

pub struct LoopFilter {
    loop_i: f32,
    loop_p: f32,
    loop_f1: f32,
    loop_f2: f32,
    bandwidth: f32,
    max_bandwidth: f32,
    max_drift: f32,
    drift: f32,
    filt1: f32,
    filt2: f32,
    steps: u32,
}

impl LoopFilter {
    /// `timestep` is the loop period in seconds. A bandwidth above the
    /// stability limit `1 / (2*pi*10*timestep)` is clamped with a warning.
    /// `initial_drift` seeds the integrator, which shortens settling when a
    /// previous run already measured the drift.
    pub fn new(bandwidth: f32, timestep: f32, max_drift: f32, initial_drift: f32) -> LoopFilter {
        assert!(timestep > 0.0 && timestep.is_finite());
        assert!(max_drift >= 0.0);
        let max_bandwidth = 1.0 / (2.0 * std::f32::consts::PI * 10.0 * timestep);
        let bandwidth = if bandwidth > max_bandwidth {
            warn!(
                "loop bandwidth reduced to {} Hz to ensure stability",
                max_bandwidth
            );
            max_bandwidth
        } else {
            bandwidth
        };
        let omega = 2.0 * std::f32::consts::PI * bandwidth;
        LoopFilter {
            loop_i: 0.25 * omega * omega * timestep,
            loop_p: omega,
            loop_f1: 6.0 * omega * timestep,
            loop_f2: 10.0 * omega * timestep,
            bandwidth,
            max_bandwidth,
            max_drift,
            drift: initial_drift.clamp(-max_drift, max_drift),
            filt1: 0.0,
            filt2: 0.0,
            steps: 0,
        }
    }

    /// Advances the filter by one timestep given the fill-level error in
    /// seconds (target minus observed, divided by the output rate).
    pub fn update(&mut self, error: f32) {
        self.drift = (self.drift + error * self.loop_i).clamp(-self.max_drift, self.max_drift);

        // fast start: run at the widest stable bandwidth right after warmup
        // and relax toward the configured one; the integrator is untouched
        let scale = self.max_bandwidth / (self.bandwidth * (1.0 + self.steps as f32 / 10.0));
        let scale = scale.max(1.0);
        self.steps = self.steps.saturating_add(1);

        self.filt1 +=
            (error * self.loop_p * scale + self.drift - self.filt1) * self.loop_f1 * scale;
        self.filt2 += (self.filt1 - self.filt2) * self.loop_f2 * scale;
    }

    /// Fractional correction to apply to the nominal ratio, bounded so the
    /// resampler ratio can never be scaled by more than 2x either way.
    pub fn correction(&self) -> f32 {
        self.filt2.clamp(-0.5, 0.5)
    }

    pub fn drift(&self) -> f32 {
        self.drift
    }

    pub fn bandwidth(&self) -> f32 {
        self.bandwidth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: f32 = 620.0e-6;

    #[test]
    fn zero_error_is_a_fixed_point() {
        let mut lf = LoopFilter::new(0.1, TS, 0.002, 4.2e-5);
        for _ in 0..200_000 {
            lf.update(0.0);
        }
        // everything converges to the seeded drift
        assert_eq!(lf.drift(), 4.2e-5);
        assert!((lf.filt1 - lf.drift()).abs() < 1.0e-8);
        assert!((lf.filt2 - lf.drift()).abs() < 1.0e-8);
        assert!((lf.correction() - lf.drift()).abs() < 1.0e-8);
    }

    #[test]
    fn disturbance_decays_after_fast_start() {
        let mut lf = LoopFilter::new(0.1, TS, 0.002, 0.0);
        // a constant one-period error that disappears again
        for _ in 0..2000 {
            lf.update(256.0 / 48000.0);
        }
        for _ in 0..2000 {
            lf.update(0.0);
        }
        // once the input error is gone the response must decay monotonically
        // (sampled coarsely to ignore ripple)
        let mut last = f32::INFINITY;
        for _ in 0..40 {
            for _ in 0..5000 {
                lf.update(0.0);
            }
            let mag = (lf.filt2 - lf.drift()).abs();
            assert!(mag <= last + 1.0e-12);
            last = mag;
        }
    }

    #[test]
    fn drift_and_correction_stay_clamped() {
        let mut lf = LoopFilter::new(0.1, TS, 0.002, 0.0);
        for i in 0..100_000 {
            // absurd fill-level errors, alternating sign
            let error = if i % 2 == 0 { 1.0e6 } else { -3.0e6 };
            lf.update(error);
            assert!(lf.drift().abs() <= 0.002);
            assert!(lf.correction().abs() <= 0.5);
            assert!(lf.correction().is_finite());
        }
    }

    #[test]
    fn bandwidth_is_clamped_for_stability() {
        let lf = LoopFilter::new(1000.0, TS, 0.002, 0.0);
        let limit = 1.0 / (2.0 * std::f32::consts::PI * 10.0 * TS);
        assert!((lf.bandwidth() - limit).abs() / limit < 1.0e-6);
    }

    #[test]
    fn square_disturbance_at_max_bandwidth_stays_bounded() {
        let limit = 1.0 / (2.0 * std::f32::consts::PI * 10.0 * TS);
        let mut lf = LoopFilter::new(limit, TS, 0.002, 0.0);
        let mut peak_first = 0.0f32;
        let mut peak_last = 0.0f32;
        for i in 0..100_000u32 {
            // +-1 period square wave on the observed fill level
            let sign = if (i / 2) % 2 == 0 { 1.0 } else { -1.0 };
            lf.update(sign * 256.0 / 48000.0);
            let mag = lf.filt2.abs();
            assert!(mag.is_finite());
            if i < 10_000 {
                peak_first = peak_first.max(mag);
            }
            if i >= 90_000 {
                peak_last = peak_last.max(mag);
            }
        }
        assert!(peak_last <= peak_first * 1.01, "{} vs {}", peak_last, peak_first);
    }

    #[test]
    fn initial_drift_is_clamped() {
        let lf = LoopFilter::new(0.1, TS, 0.002, 0.5);
        assert_eq!(lf.drift(), 0.002);
    }
}
