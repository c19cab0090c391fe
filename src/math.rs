//! Scalar helpers for filter design: normalized sinc, the modified Bessel
//! function I₀, and the Kaiser window built from it.

use std::f64::consts::PI;

#[inline]
pub fn sqr(x: f64) -> f64 {
    x * x
}

/// sin(πx)/(πx) with sinc(0) = 1.
#[inline]
pub fn sinc(x: f64) -> f64 {
    if x.abs() < 1.0e-9 {
        1.0
    } else {
        (x * PI).sin() / (x * PI)
    }
}

/// Modified Bessel function of the first kind, order zero.
///
/// Minimax polynomial in two branches around x = 5; relative error stays
/// below 1e-9 for the arguments a Kaiser window with beta <= 20 produces.
pub fn bessel_i0(x: f64) -> f64 {
    if x < 5.0 {
        let t = x / 5.0 * 2.0 - 1.0;
        let mut p = 0.0;
        p = p * t + 7.74576540800919304e-11;
        p = p * t + 3.43260953673822710e-10;
        p = p * t + 2.29943069093013127e-09;
        p = p * t + 1.75512397221419985e-08;
        p = p * t + 1.25474839385967770e-07;
        p = p * t + 8.11843452726015733e-07;
        p = p * t + 5.09192335749760076e-06;
        p = p * t + 2.89363192499752772e-05;
        p = p * t + 1.58012403747176931e-04;
        p = p * t + 7.72712220051228809e-04;
        p = p * t + 3.59015934014472781e-03;
        p = p * t + 1.47067692366668178e-02;
        p = p * t + 5.63355063502382486e-02;
        p = p * t + 1.85962516759611229e-01;
        p = p * t + 5.60335052556681257e-01;
        p = p * t + 1.40237721617911415e+00;
        p = p * t + 3.07482079878055803e+00;
        p = p * t + 5.22429631812787676e+00;
        p = p * t + 7.13485201854592876e+00;
        p = p * t + 6.29179061322175492e+00;
        p = p * t + 3.28983914405012179e+00;
        p
    } else {
        let t = 5.0 / x * 2.0 - 1.0;
        let mut p = 0.0;
        p = p * t - 7.86791617247035831e-09;
        p = p * t - 1.00530110761183567e-07;
        p = p * t + 2.00992037029333895e-07;
        p = p * t + 4.34160662975923923e-07;
        p = p * t - 9.06281731216786455e-07;
        p = p * t - 8.04515875527666453e-07;
        p = p * t + 2.08812613689774853e-06;
        p = p * t + 8.33820323156281170e-07;
        p = p * t - 3.28778426349098506e-06;
        p = p * t - 6.36789761595481956e-07;
        p = p * t + 4.30979371981555338e-06;
        p = p * t + 1.16177045793733166e-06;
        p = p * t - 5.16510588300618181e-06;
        p = p * t - 4.53780572965321393e-06;
        p = p * t + 2.35346418052302895e-06;
        p = p * t + 1.00552431959749950e-05;
        p = p * t + 2.13388450957766881e-05;
        p = p * t + 6.71944990037508168e-05;
        p = p * t + 4.10576613336662065e-04;
        p = p * t + 5.66012665634273420e-03;
        p = p * t + 4.04244506336700837e-01;
        p * x.exp() / x.sqrt()
    }
}

/// Kaiser window evaluated at t in [-1, 1].
#[inline]
pub fn kaiser(t: f64, beta: f64) -> f64 {
    bessel_i0(beta * (1.0 - t * t).max(0.0).sqrt()) / bessel_i0(beta)
}
