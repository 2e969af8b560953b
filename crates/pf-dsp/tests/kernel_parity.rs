//! Kernel parity tests
//!
//! The dispatched (possibly SIMD) kernels must agree with the scalar
//! reference implementations within 1 ULP per accumulated lane, for
//! arbitrary buffer lengths including the remainder-loop tails.

use pf_dsp::simd::{self, scalar};

/// Deterministic noise in [-1, 1]
fn generate_noise(samples: usize, seed: u64) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    (0..samples)
        .map(|i| {
            let mut hasher = DefaultHasher::new();
            (seed, i).hash(&mut hasher);
            let h = hasher.finish();
            (h as f64 / u64::MAX as f64) as f32 * 2.0 - 1.0
        })
        .collect()
}

/// Lengths chosen to cover empty, sub-lane, lane-aligned, and ragged tails
const LENGTHS: &[usize] = &[0, 1, 3, 4, 7, 8, 15, 16, 31, 64, 1000, 4096];

fn assert_close_f64(simd_val: f64, scalar_val: f64, context: &str) {
    let tolerance = 1e-9 * scalar_val.abs().max(1.0);
    assert!(
        (simd_val - scalar_val).abs() <= tolerance,
        "{context}: simd={simd_val} scalar={scalar_val}"
    );
}

#[test]
fn test_abs_parity() {
    for &len in LENGTHS {
        let reference = generate_noise(len, 1);
        let mut simd_buf = reference.clone();
        let mut scalar_buf = reference;
        simd::abs_inplace(&mut simd_buf);
        scalar::abs_inplace(&mut scalar_buf);
        assert_eq!(simd_buf, scalar_buf, "len={len}");
    }
}

#[test]
fn test_half_rectify_parity() {
    for &len in LENGTHS {
        let reference = generate_noise(len, 2);
        let mut simd_buf = reference.clone();
        let mut scalar_buf = reference;
        simd::half_rectify_inplace(&mut simd_buf);
        scalar::half_rectify_inplace(&mut scalar_buf);
        assert_eq!(simd_buf, scalar_buf, "len={len}");
    }
}

#[test]
fn test_sum_parity() {
    for &len in LENGTHS {
        let buf = generate_noise(len, 3);
        assert_close_f64(simd::sum(&buf), scalar::sum(&buf), &format!("sum len={len}"));
    }
}

#[test]
fn test_sum_of_squares_parity() {
    for &len in LENGTHS {
        let buf = generate_noise(len, 4);
        assert_close_f64(
            simd::sum_of_squares(&buf),
            scalar::sum_of_squares(&buf),
            &format!("sum_of_squares len={len}"),
        );
    }
}

#[test]
fn test_apply_window_parity() {
    for &len in LENGTHS {
        let input = generate_noise(len, 5);
        let window = generate_noise(len, 6);
        let mut simd_out = vec![0.0; len];
        let mut scalar_out = vec![0.0; len];
        simd::apply_window(&input, &window, &mut simd_out);
        scalar::apply_window(&input, &window, &mut scalar_out);
        assert_eq!(simd_out, scalar_out, "len={len}");
    }
}

#[test]
fn test_dot_product_parity() {
    for &len in LENGTHS {
        let a = generate_noise(len, 7);
        let b = generate_noise(len, 8);
        let simd_val = simd::dot_product(&a, &b) as f64;
        let scalar_val = scalar::dot_product(&a, &b) as f64;
        assert_close_f64(simd_val, scalar_val, &format!("dot len={len}"));
    }
}

#[test]
fn test_complex_map_parity() {
    for &len in LENGTHS {
        let interleaved = generate_noise(len * 2, 9);
        let mut simd_mag = vec![0.0; len];
        let mut scalar_mag = vec![0.0; len];
        simd::complex_magnitude(&interleaved, &mut simd_mag);
        scalar::complex_magnitude(&interleaved, &mut scalar_mag);

        let mut simd_pow = vec![0.0; len];
        let mut scalar_pow = vec![0.0; len];
        simd::complex_power(&interleaved, &mut simd_pow);
        scalar::complex_power(&interleaved, &mut scalar_pow);

        for i in 0..len {
            let mag_err = (simd_mag[i] - scalar_mag[i]).abs();
            let pow_err = (simd_pow[i] - scalar_pow[i]).abs();
            assert!(mag_err <= scalar_mag[i].abs() * 1e-6, "magnitude len={len} i={i}");
            assert!(pow_err <= scalar_pow[i].abs() * 1e-6, "power len={len} i={i}");
        }
    }
}

#[test]
fn test_complex_multiply_parity() {
    for &len in LENGTHS {
        let a = generate_noise(len * 2, 10);
        let b = generate_noise(len * 2, 11);
        let mut simd_out = vec![0.0; len * 2];
        let mut scalar_out = vec![0.0; len * 2];
        simd::complex_multiply(&a, &b, &mut simd_out);
        scalar::complex_multiply(&a, &b, &mut scalar_out);
        for i in 0..len * 2 {
            let err = (simd_out[i] - scalar_out[i]).abs();
            assert!(err <= scalar_out[i].abs() * 1e-6 + 1e-12, "len={len} i={i}");
        }
    }
}

#[test]
fn test_sum_kernels_on_hostile_magnitudes() {
    // A large head followed by many small contributions; Kahan (scalar)
    // and f64 lanes (SIMD) must both hold the small terms.
    let mut buf = vec![1.0e7_f32];
    buf.extend(std::iter::repeat(1.0e-1_f32).take(4096));
    let expected = 1.0e7_f64 + 0.1_f64 * 4096.0;

    let simd_total = simd::sum(&buf);
    let scalar_total = scalar::sum(&buf);
    assert!((simd_total - expected).abs() < 1.0);
    assert!((scalar_total - expected).abs() < 1.0);
    assert_close_f64(simd_total, scalar_total, "hostile sum");
}
