//! Sample format conversions between normalized f32 and the native integer
//! PCM formats. Integer encoding rounds half to even after clamping to full
//! scale; f32 passes through untouched.

/// s16 full scale is [-32768, 32767].
#[inline]
pub fn f32_to_s16(x: f32) -> i16 {
    (x * 32768.0).clamp(-32768.0, 32767.0).round_ties_even() as i16
}

#[inline]
pub fn s16_to_f32(x: i16) -> f32 {
    x as f32 * (1.0 / 32768.0)
}

/// s24 lives in the low 24 bits of an i32 container.
#[inline]
pub fn f32_to_s24(x: f32) -> i32 {
    (x * 8388608.0).clamp(-8388608.0, 8388607.0).round_ties_even() as i32
}

#[inline]
pub fn s24_to_f32(x: i32) -> f32 {
    x as f32 * (1.0 / 8388608.0)
}

/// s32 scaling goes through f64 so that full scale stays exact.
#[inline]
pub fn f32_to_s32(x: f32) -> i32 {
    (x as f64 * 2147483648.0)
        .clamp(-2147483648.0, 2147483647.0)
        .round_ties_even() as i32
}

#[inline]
pub fn s32_to_f32(x: i32) -> f32 {
    x as f32 * (1.0 / 2147483648.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s16_full_scale_and_clamp() {
        assert_eq!(f32_to_s16(0.0), 0);
        assert_eq!(f32_to_s16(-1.0), -32768);
        assert_eq!(f32_to_s16(1.0), 32767);
        assert_eq!(f32_to_s16(4.2), 32767);
        assert_eq!(f32_to_s16(-4.2), -32768);
    }

    #[test]
    fn rounds_half_to_even() {
        // x * 32768 landing exactly between two integers
        assert_eq!(f32_to_s16(0.5 / 32768.0), 0);
        assert_eq!(f32_to_s16(1.5 / 32768.0), 2);
        assert_eq!(f32_to_s16(2.5 / 32768.0), 2);
        assert_eq!(f32_to_s16(-0.5 / 32768.0), 0);
        assert_eq!(f32_to_s16(-1.5 / 32768.0), -2);
        assert_eq!(f32_to_s24(2.5 / 8388608.0), 2);
        assert_eq!(f32_to_s32((2.5 / 2147483648.0f64) as f32), 2);
    }

    #[test]
    fn s24_range() {
        assert_eq!(f32_to_s24(1.0), 8388607);
        assert_eq!(f32_to_s24(-1.0), -8388608);
        assert_eq!(s24_to_f32(-8388608), -1.0);
    }

    #[test]
    fn s32_range() {
        assert_eq!(f32_to_s32(1.0), 2147483647);
        assert_eq!(f32_to_s32(-1.0), -2147483648);
        assert_eq!(s32_to_f32(i32::MIN), -1.0);
    }

    #[test]
    fn integer_decode_encode_is_exact() {
        for v in [-32768i16, -12345, -1, 0, 1, 9999, 32767] {
            assert_eq!(f32_to_s16(s16_to_f32(v)), v);
        }
        for v in [-8388608i32, -65536, 0, 77, 8388607] {
            assert_eq!(f32_to_s24(s24_to_f32(v)), v);
        }
    }
}
