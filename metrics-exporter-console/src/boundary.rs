//! Bucket boundaries for base-2 exponential histograms.
//!
//! Exponential histograms describe their buckets with a `scale` and an integer bucket index. At a given scale, the
//! bucket at `index` covers the interval `(base^index, base^(index + 1)]` where `base = 2^(2^-scale)`. Higher scales
//! therefore produce finer buckets, and negative scales produce buckets that each span several powers of two.

/// Smallest positive subnormal `f64` (2^-1074).
const EPSILON: f64 = 5e-324;

/// Two times [`EPSILON`] (2^-1073).
const EPSILON_TIMES_2: f64 = EPSILON * 2.0;

/// Smallest exponent `n` for which `2^n` is still representable as a (subnormal) `f64`.
const MIN_POWER_OF_TWO: i32 = -1074;

/// 2^1023
const SCALEB_C1: f64 = 8.988_465_674_311_58e307;

/// 2^-1022
const SCALEB_C2: f64 = 2.225_073_858_507_201_4e-308;

/// 2^53
const SCALEB_C3: f64 = 9_007_199_254_740_992.0;

/// Calculates the lower boundary of the exponential histogram bucket at `index` for the given `scale`.
///
/// The returned value is never zero: results that would underflow are clamped to the smallest positive `f64`, so that
/// the open lower end of a bucket interval is always a meaningful, positive number. Results that overflow are
/// `f64::INFINITY`.
///
/// For scales of zero or below, the bucket index is converted to a power of two by shifting it left by `-scale` bits.
/// This shift is performed on 32-bit signed integers with wrapping semantics: the shift amount is masked to five bits
/// and any bits shifted past the sign bit are discarded. Indices produced by a well-behaved collector never get close
/// to wrapping, but the behavior is total for any input.
///
/// Two `(scale, index)` pairs sit on the edge of the subnormal range where the generic calculation would collapse onto
/// the clamp value used for the bucket below them: `(-1, -537)` and `(0, -1074)`. Both map to `2 * EPSILON` so that
/// the minimum bucket at those scales stays distinct from its upper neighbor.
pub fn lower_boundary(index: i32, scale: i32) -> f64 {
    if scale > 0 {
        let inverse_factor = scalb(std::f64::consts::LN_2, -scale);
        let lower_bound = (f64::from(index) * inverse_factor).exp();
        return if lower_bound == 0.0 { EPSILON } else { lower_bound };
    }

    if (scale == -1 && index == -537) || (scale == 0 && index == -1074) {
        return EPSILON_TIMES_2;
    }

    #[allow(clippy::cast_sign_loss)]
    let shift = scale.wrapping_neg() as u32;
    let n = index.wrapping_shl(shift);

    // n < -1074 only happens at the minimum index of a scale, e.g. at scale -1 the minimum index is -538, and
    // -538 << 1 = -1076.
    if n < MIN_POWER_OF_TWO {
        return EPSILON;
    }

    scalb(1.0, n)
}

/// Computes `x * 2^n` exactly, without going through `powi`.
///
/// `2^n` is built directly from its biased exponent. When `n` falls outside of the normal exponent range, `x` is
/// pre-scaled in up to two steps so that the final multiplication rounds only once, keeping subnormal results exact.
fn scalb(x: f64, mut n: i32) -> f64 {
    let mut y = x;
    if n > 1023 {
        y *= SCALEB_C1;
        n -= 1023;
        if n > 1023 {
            y *= SCALEB_C1;
            n -= 1023;
            if n > 1023 {
                n = 1023;
            }
        }
    } else if n < -1022 {
        y *= SCALEB_C2 * SCALEB_C3;
        n += 1022 - 53;
        if n < -1022 {
            y *= SCALEB_C2 * SCALEB_C3;
            n += 1022 - 53;
            if n < -1022 {
                n = -1022;
            }
        }
    }

    #[allow(clippy::cast_sign_loss)]
    let biased_exponent = (0x3ff + n) as u64;
    y * f64::from_bits(biased_exponent << 52)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{lower_boundary, scalb, EPSILON, EPSILON_TIMES_2};

    /// Exact `2^n` for any `n` in the representable range.
    fn power_of_two(n: i32) -> f64 {
        if n >= -1022 {
            f64::from_bits(((1023 + n) as u64) << 52)
        } else {
            f64::from_bits(1u64 << (n + 1074))
        }
    }

    /// Inclusive index range at `scale` for which both a bucket and its upper neighbor have a strictly ordered,
    /// finite, non-clamped boundary.
    fn index_range(scale: i32) -> (i32, i32) {
        if scale > 0 {
            // Stay within the normal range of `f64`, where adjacent boundaries never round onto each other.
            (-(1021 << scale), (1022 << scale) - 1)
        } else {
            let shift = -scale;
            let min = if scale == 0 { -1073 } else { -1074 >> shift };
            (min, (1023 >> shift) - 1)
        }
    }

    #[test]
    fn special_cased_boundaries() {
        assert_eq!(lower_boundary(-537, -1), EPSILON_TIMES_2);
        assert_eq!(lower_boundary(-1074, 0), EPSILON_TIMES_2);
        assert_eq!(lower_boundary(-537, -1), lower_boundary(-1074, 0));
        assert_eq!(EPSILON_TIMES_2, 2.0 * f64::from_bits(1));
    }

    #[test]
    fn epsilon_is_smallest_subnormal() {
        assert_eq!(EPSILON.to_bits(), 1);
    }

    #[test]
    fn scale_zero_is_power_of_two() {
        for n in -1073..=1023 {
            assert_eq!(lower_boundary(n, 0), power_of_two(n), "index {n}");
        }
    }

    #[test]
    fn minimum_index_clamps_to_epsilon() {
        assert_eq!(lower_boundary(-1075, 0), EPSILON);
        assert_eq!(lower_boundary(-538, -1), EPSILON);
        assert_eq!(lower_boundary(-269, -2), EPSILON);
        assert_eq!(lower_boundary(i32::MIN, 0), EPSILON);
    }

    #[test]
    fn positive_scale_known_values() {
        let cases = [
            (0, 1, 1.0),
            (1, 1, std::f64::consts::SQRT_2),
            (2, 1, 2.0),
            (-2, 1, 0.5),
            (4, 2, 2.0),
            (-8, 3, 0.5),
        ];

        for (index, scale, expected) in cases {
            let actual = lower_boundary(index, scale);
            let error = (actual - expected).abs() / expected;
            assert!(error < 1e-15, "index {index} scale {scale}: {actual} vs {expected}");
        }
    }

    #[test]
    fn negative_scale_spans_multiple_powers() {
        assert_eq!(lower_boundary(1, -1), 4.0);
        assert_eq!(lower_boundary(1, -2), 16.0);
        assert_eq!(lower_boundary(-1, -1), 0.25);
        assert_eq!(lower_boundary(3, -3), 16_777_216.0);
    }

    #[test]
    fn overflow_is_infinite() {
        assert_eq!(lower_boundary(1024, 0), f64::INFINITY);
        assert_eq!(lower_boundary(512, -1), f64::INFINITY);
        assert_eq!(lower_boundary(1025 << 10, 10), f64::INFINITY);
    }

    #[test]
    fn extreme_scales_do_not_panic() {
        for scale in [i32::MIN, i32::MIN + 1, -64, -33, -32, 33, 64, 2000, i32::MAX] {
            for index in [i32::MIN, -1, 0, 1, i32::MAX] {
                let boundary = lower_boundary(index, scale);
                assert!(boundary > 0.0, "index {index} scale {scale}: {boundary}");
            }
        }
    }

    #[test]
    fn scalb_handles_subnormals_and_overflow() {
        assert_eq!(scalb(1.0, -1074), EPSILON);
        assert_eq!(scalb(1.0, -1075), 0.0);
        assert_eq!(scalb(1.0, 1023), f64::from_bits(0x7FE0_0000_0000_0000));
        assert_eq!(scalb(1.0, 1024), f64::INFINITY);
        assert_eq!(scalb(3.0, 2), 12.0);
        assert_eq!(scalb(std::f64::consts::LN_2, -1), std::f64::consts::LN_2 / 2.0);
    }

    fn arb_scale_and_index() -> impl Strategy<Value = (i32, i32)> {
        (-10..=10i32).prop_flat_map(|scale| {
            let (min, max) = index_range(scale);
            (Just(scale), min..=max)
        })
    }

    proptest! {
        #[test]
        fn boundaries_are_positive(scale in -10..=10i32, index in any::<i32>()) {
            prop_assert!(lower_boundary(index, scale) > 0.0);
        }

        #[test]
        fn boundaries_increase_with_index((scale, index) in arb_scale_and_index()) {
            let lower = lower_boundary(index, scale);
            let upper = lower_boundary(index + 1, scale);
            prop_assert!(lower > 0.0);
            prop_assert!(upper > lower, "scale {} index {}: {} !< {}", scale, index, lower, upper);
        }
    }
}
