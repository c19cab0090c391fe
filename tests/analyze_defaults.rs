//! Sweep the resampler with the default parameters and check the reported
//! response against the design targets.

use driftloop::analyze::analyze;
use driftloop::Config;

#[test]
fn default_sweep_meets_design_targets() {
    let config = Config::default().validated().unwrap();
    let report = analyze(&config);

    assert_eq!(report.bins.len(), 480);
    assert_eq!(report.rate_in, 48000);
    assert_eq!(report.rate_out, 48000);

    // gain at the passband edge: within half a dB of the configured gain
    let edge = 0.42 * 48000.0;
    let bin = report
        .bins
        .iter()
        .min_by(|a, b| {
            (a.freq - edge)
                .abs()
                .partial_cmp(&(b.freq - edge).abs())
                .unwrap()
        })
        .unwrap();
    assert!(
        bin.gain_db > -0.5 && bin.gain_db < 0.5,
        "gain at passband edge: {} dB",
        bin.gain_db
    );

    // low-frequency bins sit at unity gain even more tightly
    assert!(report.bins[10].gain_db.abs() < 0.1);

    // average passband SNR for beta = 8
    let snr_floor = 8.7 * 8.0 + 18.0;
    assert!(
        report.average_snr_db >= snr_floor,
        "average SNR {} dB, floor {} dB",
        report.average_snr_db,
        snr_floor
    );

    // every passband bin individually beats the minimum attenuation figure
    let error_floor = -(8.7 * 8.0 + 6.0);
    for bin in &report.bins {
        if bin.freq <= report.passband_hz {
            assert!(
                bin.error_db < error_floor + 3.0,
                "noisy bin at {} Hz: {} dB",
                bin.freq,
                bin.error_db
            );
        }
    }

    assert!(report.average_latency_ms > 0.0);
    assert!(report.filter_length % 4 == 0);
}
