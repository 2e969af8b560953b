//! SIMD kernel dispatch for PulseForge
//!
//! Runtime SIMD feature detection with lazy-static dispatch tables.
//! Supports AVX2, SSE2, and NEON (ARM).
//!
//! # Design
//! - Detection happens once at startup
//! - Dispatch tables are static function pointers
//! - Zero overhead after initial detection
//! - Graceful fallback to scalar code
//!
//! Samples are `f32`; the reduction kernels (`sum`, `sum_of_squares`,
//! `dot_product`) widen lanes to `f64` before accumulating. The scalar
//! fallbacks for `sum` and `sum_of_squares` are Kahan-compensated, so SIMD
//! and scalar results agree within 1 ULP per accumulated lane.

use pf_core::Sample;
use std::sync::OnceLock;

// ============ SIMD Level Detection ============

/// Detected SIMD capability level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SimdLevel {
    /// No SIMD, scalar fallback
    Scalar = 0,
    /// SSE2 (128-bit, 4 f32s)
    Sse2 = 1,
    /// AVX2 (256-bit, 8 f32s)
    Avx2 = 2,
    /// ARM NEON (128-bit, 4 f32s)
    Neon = 3,
}

impl SimdLevel {
    /// Get the SIMD width in f32 elements
    pub const fn width(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            SimdLevel::Sse2 | SimdLevel::Neon => 4,
            SimdLevel::Avx2 => 8,
        }
    }

    /// Get human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            SimdLevel::Scalar => "Scalar",
            SimdLevel::Sse2 => "SSE2",
            SimdLevel::Avx2 => "AVX2",
            SimdLevel::Neon => "NEON",
        }
    }
}

/// Global SIMD level detection (computed once)
static DETECTED_SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Detect the best available SIMD level
pub fn detect_simd_level() -> SimdLevel {
    *DETECTED_SIMD_LEVEL.get_or_init(|| {
        let level = detect_simd_level_uncached();
        log::debug!("kernel dispatch using {} ({} lanes)", level.name(), level.width());
        level
    })
}

fn detect_simd_level_uncached() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return SimdLevel::Avx2;
        }
        // SSE2 is part of the x86_64 baseline
        SimdLevel::Sse2
    }

    #[cfg(target_arch = "aarch64")]
    {
        // NEON is always available on aarch64
        SimdLevel::Neon
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        SimdLevel::Scalar
    }
}

/// Get the current SIMD level (cached)
#[inline]
pub fn simd_level() -> SimdLevel {
    detect_simd_level()
}

// ============ Dispatch Function Types ============

/// Function pointer type for in-place elementwise maps
pub type InplaceFn = fn(&mut [Sample]);

/// Function pointer type for slice reductions with f64 accumulators
pub type ReduceFn = fn(&[Sample]) -> f64;

/// Function pointer type for elementwise multiply into an output slice
pub type WindowFn = fn(&[Sample], &[Sample], &mut [Sample]);

/// Function pointer type for inner products
pub type DotFn = fn(&[Sample], &[Sample]) -> Sample;

/// Function pointer type for complex pair maps (interleaved re/im input)
pub type ComplexMapFn = fn(&[Sample], &mut [Sample]);

/// Function pointer type for complex pair products
pub type ComplexMulFn = fn(&[Sample], &[Sample], &mut [Sample]);

// ============ Dispatch Table ============

/// Dispatch table for the elementwise kernels
pub struct KernelDispatch {
    /// Full-wave rectification: `x -> |x|`
    pub abs_inplace: InplaceFn,
    /// Half-wave rectification: `x -> max(0, x)`
    pub half_rectify_inplace: InplaceFn,
    /// Sum with double-precision accumulation
    pub sum: ReduceFn,
    /// Sum of squares with double-precision accumulation
    pub sum_of_squares: ReduceFn,
    /// Elementwise multiply by a window function
    pub apply_window: WindowFn,
    /// Inner product (FIR convolution workhorse)
    pub dot_product: DotFn,
    /// Magnitude of interleaved complex pairs
    pub complex_magnitude: ComplexMapFn,
    /// Squared magnitude of interleaved complex pairs
    pub complex_power: ComplexMapFn,
    /// Product of interleaved complex pairs
    pub complex_multiply: ComplexMulFn,
    /// SIMD level used
    pub level: SimdLevel,
}

impl KernelDispatch {
    /// Get the global dispatch table
    pub fn get() -> &'static Self {
        static DISPATCH: OnceLock<KernelDispatch> = OnceLock::new();
        DISPATCH.get_or_init(|| Self::new(detect_simd_level()))
    }

    /// Create dispatch table for specific SIMD level
    fn new(level: SimdLevel) -> Self {
        match level {
            SimdLevel::Avx2 => Self {
                abs_inplace: abs_avx2,
                half_rectify_inplace: half_rectify_avx2,
                sum: sum_avx2,
                sum_of_squares: sum_of_squares_avx2,
                apply_window: apply_window_avx2,
                dot_product: dot_product_avx2,
                complex_magnitude: complex_magnitude_sse2,
                complex_power: complex_power_sse2,
                complex_multiply: complex_multiply_sse2,
                level,
            },
            SimdLevel::Sse2 => Self {
                abs_inplace: abs_sse2,
                half_rectify_inplace: half_rectify_sse2,
                sum: sum_sse2,
                sum_of_squares: sum_of_squares_sse2,
                apply_window: apply_window_sse2,
                dot_product: dot_product_sse2,
                complex_magnitude: complex_magnitude_sse2,
                complex_power: complex_power_sse2,
                complex_multiply: complex_multiply_sse2,
                level,
            },
            SimdLevel::Neon => Self {
                abs_inplace: abs_neon,
                half_rectify_inplace: half_rectify_neon,
                sum: sum_neon,
                sum_of_squares: sum_of_squares_neon,
                apply_window: apply_window_neon,
                dot_product: dot_product_neon,
                complex_magnitude: complex_magnitude_neon,
                complex_power: complex_power_neon,
                complex_multiply: complex_multiply_neon,
                level,
            },
            SimdLevel::Scalar => Self {
                abs_inplace: scalar::abs_inplace,
                half_rectify_inplace: scalar::half_rectify_inplace,
                sum: scalar::sum,
                sum_of_squares: scalar::sum_of_squares,
                apply_window: scalar::apply_window,
                dot_product: scalar::dot_product,
                complex_magnitude: scalar::complex_magnitude,
                complex_power: scalar::complex_power,
                complex_multiply: scalar::complex_multiply,
                level,
            },
        }
    }
}

// ============ Scalar Implementations (Fallback) ============

/// Scalar reference kernels
///
/// Also the parity baseline for the SIMD paths.
pub mod scalar {
    use super::Sample;

    pub fn abs_inplace(buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = sample.abs();
        }
    }

    pub fn half_rectify_inplace(buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = sample.max(0.0);
        }
    }

    /// Kahan-compensated sum
    pub fn sum(buffer: &[Sample]) -> f64 {
        let mut total = 0.0_f64;
        let mut comp = 0.0_f64;
        for &x in buffer {
            let y = x as f64 - comp;
            let t = total + y;
            comp = (t - total) - y;
            total = t;
        }
        total
    }

    /// Kahan-compensated sum of squares
    pub fn sum_of_squares(buffer: &[Sample]) -> f64 {
        let mut total = 0.0_f64;
        let mut comp = 0.0_f64;
        for &x in buffer {
            let xx = x as f64;
            let y = xx * xx - comp;
            let t = total + y;
            comp = (t - total) - y;
            total = t;
        }
        total
    }

    pub fn apply_window(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
        let len = input.len().min(window.len()).min(output.len());
        for i in 0..len {
            output[i] = input[i] * window[i];
        }
    }

    pub fn dot_product(a: &[Sample], b: &[Sample]) -> Sample {
        let len = a.len().min(b.len());
        let mut acc = 0.0_f64;
        for i in 0..len {
            acc += a[i] as f64 * b[i] as f64;
        }
        acc as Sample
    }

    pub fn complex_magnitude(interleaved: &[Sample], output: &mut [Sample]) {
        let pairs = (interleaved.len() / 2).min(output.len());
        for i in 0..pairs {
            let re = interleaved[2 * i];
            let im = interleaved[2 * i + 1];
            output[i] = (re * re + im * im).sqrt();
        }
    }

    pub fn complex_power(interleaved: &[Sample], output: &mut [Sample]) {
        let pairs = (interleaved.len() / 2).min(output.len());
        for i in 0..pairs {
            let re = interleaved[2 * i];
            let im = interleaved[2 * i + 1];
            output[i] = re * re + im * im;
        }
    }

    pub fn complex_multiply(a: &[Sample], b: &[Sample], output: &mut [Sample]) {
        let pairs = (a.len() / 2).min(b.len() / 2).min(output.len() / 2);
        for i in 0..pairs {
            let (ar, ai) = (a[2 * i], a[2 * i + 1]);
            let (br, bi) = (b[2 * i], b[2 * i + 1]);
            output[2 * i] = ar * br - ai * bi;
            output[2 * i + 1] = ar * bi + ai * br;
        }
    }
}

// ============ x86_64 SIMD Implementations ============

#[cfg(target_arch = "x86_64")]
mod x86_impl {
    use super::*;
    use std::arch::x86_64::*;

    // --- SSE2 (128-bit, 4 f32s) ---

    #[target_feature(enable = "sse2")]
    pub unsafe fn abs_sse2_impl(buffer: &mut [Sample]) {
        let mask = _mm_castsi128_ps(_mm_set1_epi32(0x7FFF_FFFF));
        let len = buffer.len();
        let simd_len = len - (len % 4);
        let ptr = buffer.as_mut_ptr();

        for i in (0..simd_len).step_by(4) {
            let v = _mm_loadu_ps(ptr.add(i));
            _mm_storeu_ps(ptr.add(i), _mm_and_ps(v, mask));
        }

        for sample in &mut buffer[simd_len..len] {
            *sample = sample.abs();
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn half_rectify_sse2_impl(buffer: &mut [Sample]) {
        let zero = _mm_setzero_ps();
        let len = buffer.len();
        let simd_len = len - (len % 4);
        let ptr = buffer.as_mut_ptr();

        for i in (0..simd_len).step_by(4) {
            let v = _mm_loadu_ps(ptr.add(i));
            _mm_storeu_ps(ptr.add(i), _mm_max_ps(v, zero));
        }

        for sample in &mut buffer[simd_len..len] {
            *sample = sample.max(0.0);
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn sum_sse2_impl(buffer: &[Sample]) -> f64 {
        let len = buffer.len();
        let simd_len = len - (len % 4);
        let ptr = buffer.as_ptr();

        let mut acc = _mm_setzero_pd();
        for i in (0..simd_len).step_by(4) {
            let v = _mm_loadu_ps(ptr.add(i));
            let lo = _mm_cvtps_pd(v);
            let hi = _mm_cvtps_pd(_mm_movehl_ps(v, v));
            acc = _mm_add_pd(acc, _mm_add_pd(lo, hi));
        }

        let mut lanes = [0.0_f64; 2];
        _mm_storeu_pd(lanes.as_mut_ptr(), acc);
        let mut total = lanes[0] + lanes[1];

        for &x in &buffer[simd_len..len] {
            total += x as f64;
        }
        total
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn sum_of_squares_sse2_impl(buffer: &[Sample]) -> f64 {
        let len = buffer.len();
        let simd_len = len - (len % 4);
        let ptr = buffer.as_ptr();

        let mut acc = _mm_setzero_pd();
        for i in (0..simd_len).step_by(4) {
            let v = _mm_loadu_ps(ptr.add(i));
            let lo = _mm_cvtps_pd(v);
            let hi = _mm_cvtps_pd(_mm_movehl_ps(v, v));
            acc = _mm_add_pd(acc, _mm_mul_pd(lo, lo));
            acc = _mm_add_pd(acc, _mm_mul_pd(hi, hi));
        }

        let mut lanes = [0.0_f64; 2];
        _mm_storeu_pd(lanes.as_mut_ptr(), acc);
        let mut total = lanes[0] + lanes[1];

        for &x in &buffer[simd_len..len] {
            let xx = x as f64;
            total += xx * xx;
        }
        total
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn apply_window_sse2_impl(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
        let len = input.len().min(window.len()).min(output.len());
        let simd_len = len - (len % 4);
        let in_ptr = input.as_ptr();
        let win_ptr = window.as_ptr();
        let out_ptr = output.as_mut_ptr();

        for i in (0..simd_len).step_by(4) {
            let a = _mm_loadu_ps(in_ptr.add(i));
            let w = _mm_loadu_ps(win_ptr.add(i));
            _mm_storeu_ps(out_ptr.add(i), _mm_mul_ps(a, w));
        }

        for i in simd_len..len {
            output[i] = input[i] * window[i];
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn dot_product_sse2_impl(a: &[Sample], b: &[Sample]) -> Sample {
        let len = a.len().min(b.len());
        let simd_len = len - (len % 4);
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();

        let mut acc = _mm_setzero_pd();
        for i in (0..simd_len).step_by(4) {
            let va = _mm_loadu_ps(a_ptr.add(i));
            let vb = _mm_loadu_ps(b_ptr.add(i));
            let lo = _mm_mul_pd(_mm_cvtps_pd(va), _mm_cvtps_pd(vb));
            let hi = _mm_mul_pd(
                _mm_cvtps_pd(_mm_movehl_ps(va, va)),
                _mm_cvtps_pd(_mm_movehl_ps(vb, vb)),
            );
            acc = _mm_add_pd(acc, _mm_add_pd(lo, hi));
        }

        let mut lanes = [0.0_f64; 2];
        _mm_storeu_pd(lanes.as_mut_ptr(), acc);
        let mut total = lanes[0] + lanes[1];

        for i in simd_len..len {
            total += a[i] as f64 * b[i] as f64;
        }
        total as Sample
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn complex_power_sse2_impl(interleaved: &[Sample], output: &mut [Sample]) {
        let pairs = (interleaved.len() / 2).min(output.len());
        let simd_pairs = pairs - (pairs % 4);
        let in_ptr = interleaved.as_ptr();
        let out_ptr = output.as_mut_ptr();

        for p in (0..simd_pairs).step_by(4) {
            let v0 = _mm_loadu_ps(in_ptr.add(2 * p)); // re0 im0 re1 im1
            let v1 = _mm_loadu_ps(in_ptr.add(2 * p + 4)); // re2 im2 re3 im3
            let re = _mm_shuffle_ps(v0, v1, 0b10_00_10_00);
            let im = _mm_shuffle_ps(v0, v1, 0b11_01_11_01);
            let power = _mm_add_ps(_mm_mul_ps(re, re), _mm_mul_ps(im, im));
            _mm_storeu_ps(out_ptr.add(p), power);
        }

        for p in simd_pairs..pairs {
            let re = interleaved[2 * p];
            let im = interleaved[2 * p + 1];
            output[p] = re * re + im * im;
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn complex_magnitude_sse2_impl(interleaved: &[Sample], output: &mut [Sample]) {
        let pairs = (interleaved.len() / 2).min(output.len());
        let simd_pairs = pairs - (pairs % 4);
        let in_ptr = interleaved.as_ptr();
        let out_ptr = output.as_mut_ptr();

        for p in (0..simd_pairs).step_by(4) {
            let v0 = _mm_loadu_ps(in_ptr.add(2 * p));
            let v1 = _mm_loadu_ps(in_ptr.add(2 * p + 4));
            let re = _mm_shuffle_ps(v0, v1, 0b10_00_10_00);
            let im = _mm_shuffle_ps(v0, v1, 0b11_01_11_01);
            let power = _mm_add_ps(_mm_mul_ps(re, re), _mm_mul_ps(im, im));
            _mm_storeu_ps(out_ptr.add(p), _mm_sqrt_ps(power));
        }

        for p in simd_pairs..pairs {
            let re = interleaved[2 * p];
            let im = interleaved[2 * p + 1];
            output[p] = (re * re + im * im).sqrt();
        }
    }

    #[target_feature(enable = "sse2")]
    pub unsafe fn complex_multiply_sse2_impl(a: &[Sample], b: &[Sample], output: &mut [Sample]) {
        let pairs = (a.len() / 2).min(b.len() / 2).min(output.len() / 2);
        let simd_pairs = pairs - (pairs % 4);
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();
        let out_ptr = output.as_mut_ptr();

        for p in (0..simd_pairs).step_by(4) {
            let a0 = _mm_loadu_ps(a_ptr.add(2 * p));
            let a1 = _mm_loadu_ps(a_ptr.add(2 * p + 4));
            let b0 = _mm_loadu_ps(b_ptr.add(2 * p));
            let b1 = _mm_loadu_ps(b_ptr.add(2 * p + 4));

            let ar = _mm_shuffle_ps(a0, a1, 0b10_00_10_00);
            let ai = _mm_shuffle_ps(a0, a1, 0b11_01_11_01);
            let br = _mm_shuffle_ps(b0, b1, 0b10_00_10_00);
            let bi = _mm_shuffle_ps(b0, b1, 0b11_01_11_01);

            let out_re = _mm_sub_ps(_mm_mul_ps(ar, br), _mm_mul_ps(ai, bi));
            let out_im = _mm_add_ps(_mm_mul_ps(ar, bi), _mm_mul_ps(ai, br));

            _mm_storeu_ps(out_ptr.add(2 * p), _mm_unpacklo_ps(out_re, out_im));
            _mm_storeu_ps(out_ptr.add(2 * p + 4), _mm_unpackhi_ps(out_re, out_im));
        }

        for p in simd_pairs..pairs {
            let (ar, ai) = (a[2 * p], a[2 * p + 1]);
            let (br, bi) = (b[2 * p], b[2 * p + 1]);
            output[2 * p] = ar * br - ai * bi;
            output[2 * p + 1] = ar * bi + ai * br;
        }
    }

    // --- AVX2 (256-bit, 8 f32s) ---

    #[target_feature(enable = "avx2", enable = "fma")]
    pub unsafe fn abs_avx2_impl(buffer: &mut [Sample]) {
        let mask = _mm256_castsi256_ps(_mm256_set1_epi32(0x7FFF_FFFF));
        let len = buffer.len();
        let simd_len = len - (len % 8);
        let ptr = buffer.as_mut_ptr();

        for i in (0..simd_len).step_by(8) {
            let v = _mm256_loadu_ps(ptr.add(i));
            _mm256_storeu_ps(ptr.add(i), _mm256_and_ps(v, mask));
        }

        for sample in &mut buffer[simd_len..len] {
            *sample = sample.abs();
        }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    pub unsafe fn half_rectify_avx2_impl(buffer: &mut [Sample]) {
        let zero = _mm256_setzero_ps();
        let len = buffer.len();
        let simd_len = len - (len % 8);
        let ptr = buffer.as_mut_ptr();

        for i in (0..simd_len).step_by(8) {
            let v = _mm256_loadu_ps(ptr.add(i));
            _mm256_storeu_ps(ptr.add(i), _mm256_max_ps(v, zero));
        }

        for sample in &mut buffer[simd_len..len] {
            *sample = sample.max(0.0);
        }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    pub unsafe fn sum_avx2_impl(buffer: &[Sample]) -> f64 {
        let len = buffer.len();
        let simd_len = len - (len % 8);
        let ptr = buffer.as_ptr();

        let mut acc = _mm256_setzero_pd();
        for i in (0..simd_len).step_by(8) {
            let v = _mm256_loadu_ps(ptr.add(i));
            let lo = _mm256_cvtps_pd(_mm256_castps256_ps128(v));
            let hi = _mm256_cvtps_pd(_mm256_extractf128_ps(v, 1));
            acc = _mm256_add_pd(acc, _mm256_add_pd(lo, hi));
        }

        let mut lanes = [0.0_f64; 4];
        _mm256_storeu_pd(lanes.as_mut_ptr(), acc);
        let mut total = lanes[0] + lanes[1] + lanes[2] + lanes[3];

        for &x in &buffer[simd_len..len] {
            total += x as f64;
        }
        total
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    pub unsafe fn sum_of_squares_avx2_impl(buffer: &[Sample]) -> f64 {
        let len = buffer.len();
        let simd_len = len - (len % 8);
        let ptr = buffer.as_ptr();

        let mut acc = _mm256_setzero_pd();
        for i in (0..simd_len).step_by(8) {
            let v = _mm256_loadu_ps(ptr.add(i));
            let lo = _mm256_cvtps_pd(_mm256_castps256_ps128(v));
            let hi = _mm256_cvtps_pd(_mm256_extractf128_ps(v, 1));
            acc = _mm256_fmadd_pd(lo, lo, acc);
            acc = _mm256_fmadd_pd(hi, hi, acc);
        }

        let mut lanes = [0.0_f64; 4];
        _mm256_storeu_pd(lanes.as_mut_ptr(), acc);
        let mut total = lanes[0] + lanes[1] + lanes[2] + lanes[3];

        for &x in &buffer[simd_len..len] {
            let xx = x as f64;
            total += xx * xx;
        }
        total
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    pub unsafe fn apply_window_avx2_impl(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
        let len = input.len().min(window.len()).min(output.len());
        let simd_len = len - (len % 8);
        let in_ptr = input.as_ptr();
        let win_ptr = window.as_ptr();
        let out_ptr = output.as_mut_ptr();

        for i in (0..simd_len).step_by(8) {
            let a = _mm256_loadu_ps(in_ptr.add(i));
            let w = _mm256_loadu_ps(win_ptr.add(i));
            _mm256_storeu_ps(out_ptr.add(i), _mm256_mul_ps(a, w));
        }

        for i in simd_len..len {
            output[i] = input[i] * window[i];
        }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    pub unsafe fn dot_product_avx2_impl(a: &[Sample], b: &[Sample]) -> Sample {
        let len = a.len().min(b.len());
        let simd_len = len - (len % 8);
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();

        let mut acc = _mm256_setzero_pd();
        for i in (0..simd_len).step_by(8) {
            let va = _mm256_loadu_ps(a_ptr.add(i));
            let vb = _mm256_loadu_ps(b_ptr.add(i));
            let a_lo = _mm256_cvtps_pd(_mm256_castps256_ps128(va));
            let a_hi = _mm256_cvtps_pd(_mm256_extractf128_ps(va, 1));
            let b_lo = _mm256_cvtps_pd(_mm256_castps256_ps128(vb));
            let b_hi = _mm256_cvtps_pd(_mm256_extractf128_ps(vb, 1));
            acc = _mm256_fmadd_pd(a_lo, b_lo, acc);
            acc = _mm256_fmadd_pd(a_hi, b_hi, acc);
        }

        let mut lanes = [0.0_f64; 4];
        _mm256_storeu_pd(lanes.as_mut_ptr(), acc);
        let mut total = lanes[0] + lanes[1] + lanes[2] + lanes[3];

        for i in simd_len..len {
            total += a[i] as f64 * b[i] as f64;
        }
        total as Sample
    }
}

// ============ ARM NEON Implementations ============

#[cfg(target_arch = "aarch64")]
mod arm_impl {
    use super::*;
    use std::arch::aarch64::*;

    pub unsafe fn abs_neon_impl(buffer: &mut [Sample]) {
        unsafe {
            let len = buffer.len();
            let simd_len = len - (len % 4);
            let ptr = buffer.as_mut_ptr();

            for i in (0..simd_len).step_by(4) {
                let v = vld1q_f32(ptr.add(i));
                vst1q_f32(ptr.add(i), vabsq_f32(v));
            }

            for sample in &mut buffer[simd_len..len] {
                *sample = sample.abs();
            }
        }
    }

    pub unsafe fn half_rectify_neon_impl(buffer: &mut [Sample]) {
        unsafe {
            let zero = vdupq_n_f32(0.0);
            let len = buffer.len();
            let simd_len = len - (len % 4);
            let ptr = buffer.as_mut_ptr();

            for i in (0..simd_len).step_by(4) {
                let v = vld1q_f32(ptr.add(i));
                vst1q_f32(ptr.add(i), vmaxq_f32(v, zero));
            }

            for sample in &mut buffer[simd_len..len] {
                *sample = sample.max(0.0);
            }
        }
    }

    pub unsafe fn sum_neon_impl(buffer: &[Sample]) -> f64 {
        unsafe {
            let len = buffer.len();
            let simd_len = len - (len % 4);
            let ptr = buffer.as_ptr();

            let mut acc = vdupq_n_f64(0.0);
            for i in (0..simd_len).step_by(4) {
                let v = vld1q_f32(ptr.add(i));
                let lo = vcvt_f64_f32(vget_low_f32(v));
                let hi = vcvt_high_f64_f32(v);
                acc = vaddq_f64(acc, vaddq_f64(lo, hi));
            }

            let mut total = vaddvq_f64(acc);
            for &x in &buffer[simd_len..len] {
                total += x as f64;
            }
            total
        }
    }

    pub unsafe fn sum_of_squares_neon_impl(buffer: &[Sample]) -> f64 {
        unsafe {
            let len = buffer.len();
            let simd_len = len - (len % 4);
            let ptr = buffer.as_ptr();

            let mut acc = vdupq_n_f64(0.0);
            for i in (0..simd_len).step_by(4) {
                let v = vld1q_f32(ptr.add(i));
                let lo = vcvt_f64_f32(vget_low_f32(v));
                let hi = vcvt_high_f64_f32(v);
                acc = vfmaq_f64(acc, lo, lo);
                acc = vfmaq_f64(acc, hi, hi);
            }

            let mut total = vaddvq_f64(acc);
            for &x in &buffer[simd_len..len] {
                let xx = x as f64;
                total += xx * xx;
            }
            total
        }
    }

    pub unsafe fn apply_window_neon_impl(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
        unsafe {
            let len = input.len().min(window.len()).min(output.len());
            let simd_len = len - (len % 4);
            let in_ptr = input.as_ptr();
            let win_ptr = window.as_ptr();
            let out_ptr = output.as_mut_ptr();

            for i in (0..simd_len).step_by(4) {
                let a = vld1q_f32(in_ptr.add(i));
                let w = vld1q_f32(win_ptr.add(i));
                vst1q_f32(out_ptr.add(i), vmulq_f32(a, w));
            }

            for i in simd_len..len {
                output[i] = input[i] * window[i];
            }
        }
    }

    pub unsafe fn dot_product_neon_impl(a: &[Sample], b: &[Sample]) -> Sample {
        unsafe {
            let len = a.len().min(b.len());
            let simd_len = len - (len % 4);
            let a_ptr = a.as_ptr();
            let b_ptr = b.as_ptr();

            let mut acc = vdupq_n_f64(0.0);
            for i in (0..simd_len).step_by(4) {
                let va = vld1q_f32(a_ptr.add(i));
                let vb = vld1q_f32(b_ptr.add(i));
                acc = vfmaq_f64(acc, vcvt_f64_f32(vget_low_f32(va)), vcvt_f64_f32(vget_low_f32(vb)));
                acc = vfmaq_f64(acc, vcvt_high_f64_f32(va), vcvt_high_f64_f32(vb));
            }

            let mut total = vaddvq_f64(acc);
            for i in simd_len..len {
                total += a[i] as f64 * b[i] as f64;
            }
            total as Sample
        }
    }

    pub unsafe fn complex_power_neon_impl(interleaved: &[Sample], output: &mut [Sample]) {
        unsafe {
            let pairs = (interleaved.len() / 2).min(output.len());
            let simd_pairs = pairs - (pairs % 4);
            let in_ptr = interleaved.as_ptr();
            let out_ptr = output.as_mut_ptr();

            for p in (0..simd_pairs).step_by(4) {
                let v = vld2q_f32(in_ptr.add(2 * p));
                let power = vfmaq_f32(vmulq_f32(v.0, v.0), v.1, v.1);
                vst1q_f32(out_ptr.add(p), power);
            }

            for p in simd_pairs..pairs {
                let re = interleaved[2 * p];
                let im = interleaved[2 * p + 1];
                output[p] = re * re + im * im;
            }
        }
    }

    pub unsafe fn complex_magnitude_neon_impl(interleaved: &[Sample], output: &mut [Sample]) {
        unsafe {
            let pairs = (interleaved.len() / 2).min(output.len());
            let simd_pairs = pairs - (pairs % 4);
            let in_ptr = interleaved.as_ptr();
            let out_ptr = output.as_mut_ptr();

            for p in (0..simd_pairs).step_by(4) {
                let v = vld2q_f32(in_ptr.add(2 * p));
                let power = vfmaq_f32(vmulq_f32(v.0, v.0), v.1, v.1);
                vst1q_f32(out_ptr.add(p), vsqrtq_f32(power));
            }

            for p in simd_pairs..pairs {
                let re = interleaved[2 * p];
                let im = interleaved[2 * p + 1];
                output[p] = (re * re + im * im).sqrt();
            }
        }
    }

    pub unsafe fn complex_multiply_neon_impl(a: &[Sample], b: &[Sample], output: &mut [Sample]) {
        unsafe {
            let pairs = (a.len() / 2).min(b.len() / 2).min(output.len() / 2);
            let simd_pairs = pairs - (pairs % 4);
            let a_ptr = a.as_ptr();
            let b_ptr = b.as_ptr();
            let out_ptr = output.as_mut_ptr();

            for p in (0..simd_pairs).step_by(4) {
                let va = vld2q_f32(a_ptr.add(2 * p));
                let vb = vld2q_f32(b_ptr.add(2 * p));
                let out_re = vsubq_f32(vmulq_f32(va.0, vb.0), vmulq_f32(va.1, vb.1));
                let out_im = vaddq_f32(vmulq_f32(va.0, vb.1), vmulq_f32(va.1, vb.0));
                vst2q_f32(out_ptr.add(2 * p), float32x4x2_t(out_re, out_im));
            }

            for p in simd_pairs..pairs {
                let (ar, ai) = (a[2 * p], a[2 * p + 1]);
                let (br, bi) = (b[2 * p], b[2 * p + 1]);
                output[2 * p] = ar * br - ai * bi;
                output[2 * p + 1] = ar * bi + ai * br;
            }
        }
    }
}

// ============ Safe Wrapper Functions ============

// SSE2 wrappers
#[cfg(target_arch = "x86_64")]
fn abs_sse2(buffer: &mut [Sample]) {
    unsafe { x86_impl::abs_sse2_impl(buffer) }
}

#[cfg(target_arch = "x86_64")]
fn half_rectify_sse2(buffer: &mut [Sample]) {
    unsafe { x86_impl::half_rectify_sse2_impl(buffer) }
}

#[cfg(target_arch = "x86_64")]
fn sum_sse2(buffer: &[Sample]) -> f64 {
    unsafe { x86_impl::sum_sse2_impl(buffer) }
}

#[cfg(target_arch = "x86_64")]
fn sum_of_squares_sse2(buffer: &[Sample]) -> f64 {
    unsafe { x86_impl::sum_of_squares_sse2_impl(buffer) }
}

#[cfg(target_arch = "x86_64")]
fn apply_window_sse2(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
    unsafe { x86_impl::apply_window_sse2_impl(input, window, output) }
}

#[cfg(target_arch = "x86_64")]
fn dot_product_sse2(a: &[Sample], b: &[Sample]) -> Sample {
    unsafe { x86_impl::dot_product_sse2_impl(a, b) }
}

#[cfg(target_arch = "x86_64")]
fn complex_magnitude_sse2(interleaved: &[Sample], output: &mut [Sample]) {
    unsafe { x86_impl::complex_magnitude_sse2_impl(interleaved, output) }
}

#[cfg(target_arch = "x86_64")]
fn complex_power_sse2(interleaved: &[Sample], output: &mut [Sample]) {
    unsafe { x86_impl::complex_power_sse2_impl(interleaved, output) }
}

#[cfg(target_arch = "x86_64")]
fn complex_multiply_sse2(a: &[Sample], b: &[Sample], output: &mut [Sample]) {
    unsafe { x86_impl::complex_multiply_sse2_impl(a, b, output) }
}

// AVX2 wrappers
#[cfg(target_arch = "x86_64")]
fn abs_avx2(buffer: &mut [Sample]) {
    unsafe { x86_impl::abs_avx2_impl(buffer) }
}

#[cfg(target_arch = "x86_64")]
fn half_rectify_avx2(buffer: &mut [Sample]) {
    unsafe { x86_impl::half_rectify_avx2_impl(buffer) }
}

#[cfg(target_arch = "x86_64")]
fn sum_avx2(buffer: &[Sample]) -> f64 {
    unsafe { x86_impl::sum_avx2_impl(buffer) }
}

#[cfg(target_arch = "x86_64")]
fn sum_of_squares_avx2(buffer: &[Sample]) -> f64 {
    unsafe { x86_impl::sum_of_squares_avx2_impl(buffer) }
}

#[cfg(target_arch = "x86_64")]
fn apply_window_avx2(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
    unsafe { x86_impl::apply_window_avx2_impl(input, window, output) }
}

#[cfg(target_arch = "x86_64")]
fn dot_product_avx2(a: &[Sample], b: &[Sample]) -> Sample {
    unsafe { x86_impl::dot_product_avx2_impl(a, b) }
}

// NEON wrappers
#[cfg(target_arch = "aarch64")]
fn abs_neon(buffer: &mut [Sample]) {
    unsafe { arm_impl::abs_neon_impl(buffer) }
}

#[cfg(target_arch = "aarch64")]
fn half_rectify_neon(buffer: &mut [Sample]) {
    unsafe { arm_impl::half_rectify_neon_impl(buffer) }
}

#[cfg(target_arch = "aarch64")]
fn sum_neon(buffer: &[Sample]) -> f64 {
    unsafe { arm_impl::sum_neon_impl(buffer) }
}

#[cfg(target_arch = "aarch64")]
fn sum_of_squares_neon(buffer: &[Sample]) -> f64 {
    unsafe { arm_impl::sum_of_squares_neon_impl(buffer) }
}

#[cfg(target_arch = "aarch64")]
fn apply_window_neon(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
    unsafe { arm_impl::apply_window_neon_impl(input, window, output) }
}

#[cfg(target_arch = "aarch64")]
fn dot_product_neon(a: &[Sample], b: &[Sample]) -> Sample {
    unsafe { arm_impl::dot_product_neon_impl(a, b) }
}

#[cfg(target_arch = "aarch64")]
fn complex_magnitude_neon(interleaved: &[Sample], output: &mut [Sample]) {
    unsafe { arm_impl::complex_magnitude_neon_impl(interleaved, output) }
}

#[cfg(target_arch = "aarch64")]
fn complex_power_neon(interleaved: &[Sample], output: &mut [Sample]) {
    unsafe { arm_impl::complex_power_neon_impl(interleaved, output) }
}

#[cfg(target_arch = "aarch64")]
fn complex_multiply_neon(a: &[Sample], b: &[Sample], output: &mut [Sample]) {
    unsafe { arm_impl::complex_multiply_neon_impl(a, b, output) }
}

// Fallback stubs for non-matching architectures
#[cfg(not(target_arch = "x86_64"))]
fn abs_sse2(buffer: &mut [Sample]) {
    scalar::abs_inplace(buffer)
}
#[cfg(not(target_arch = "x86_64"))]
fn half_rectify_sse2(buffer: &mut [Sample]) {
    scalar::half_rectify_inplace(buffer)
}
#[cfg(not(target_arch = "x86_64"))]
fn sum_sse2(buffer: &[Sample]) -> f64 {
    scalar::sum(buffer)
}
#[cfg(not(target_arch = "x86_64"))]
fn sum_of_squares_sse2(buffer: &[Sample]) -> f64 {
    scalar::sum_of_squares(buffer)
}
#[cfg(not(target_arch = "x86_64"))]
fn apply_window_sse2(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
    scalar::apply_window(input, window, output)
}
#[cfg(not(target_arch = "x86_64"))]
fn dot_product_sse2(a: &[Sample], b: &[Sample]) -> Sample {
    scalar::dot_product(a, b)
}
#[cfg(not(target_arch = "x86_64"))]
fn complex_magnitude_sse2(interleaved: &[Sample], output: &mut [Sample]) {
    scalar::complex_magnitude(interleaved, output)
}
#[cfg(not(target_arch = "x86_64"))]
fn complex_power_sse2(interleaved: &[Sample], output: &mut [Sample]) {
    scalar::complex_power(interleaved, output)
}
#[cfg(not(target_arch = "x86_64"))]
fn complex_multiply_sse2(a: &[Sample], b: &[Sample], output: &mut [Sample]) {
    scalar::complex_multiply(a, b, output)
}

#[cfg(not(target_arch = "x86_64"))]
fn abs_avx2(buffer: &mut [Sample]) {
    scalar::abs_inplace(buffer)
}
#[cfg(not(target_arch = "x86_64"))]
fn half_rectify_avx2(buffer: &mut [Sample]) {
    scalar::half_rectify_inplace(buffer)
}
#[cfg(not(target_arch = "x86_64"))]
fn sum_avx2(buffer: &[Sample]) -> f64 {
    scalar::sum(buffer)
}
#[cfg(not(target_arch = "x86_64"))]
fn sum_of_squares_avx2(buffer: &[Sample]) -> f64 {
    scalar::sum_of_squares(buffer)
}
#[cfg(not(target_arch = "x86_64"))]
fn apply_window_avx2(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
    scalar::apply_window(input, window, output)
}
#[cfg(not(target_arch = "x86_64"))]
fn dot_product_avx2(a: &[Sample], b: &[Sample]) -> Sample {
    scalar::dot_product(a, b)
}

#[cfg(not(target_arch = "aarch64"))]
fn abs_neon(buffer: &mut [Sample]) {
    scalar::abs_inplace(buffer)
}
#[cfg(not(target_arch = "aarch64"))]
fn half_rectify_neon(buffer: &mut [Sample]) {
    scalar::half_rectify_inplace(buffer)
}
#[cfg(not(target_arch = "aarch64"))]
fn sum_neon(buffer: &[Sample]) -> f64 {
    scalar::sum(buffer)
}
#[cfg(not(target_arch = "aarch64"))]
fn sum_of_squares_neon(buffer: &[Sample]) -> f64 {
    scalar::sum_of_squares(buffer)
}
#[cfg(not(target_arch = "aarch64"))]
fn apply_window_neon(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
    scalar::apply_window(input, window, output)
}
#[cfg(not(target_arch = "aarch64"))]
fn dot_product_neon(a: &[Sample], b: &[Sample]) -> Sample {
    scalar::dot_product(a, b)
}
#[cfg(not(target_arch = "aarch64"))]
fn complex_magnitude_neon(interleaved: &[Sample], output: &mut [Sample]) {
    scalar::complex_magnitude(interleaved, output)
}
#[cfg(not(target_arch = "aarch64"))]
fn complex_power_neon(interleaved: &[Sample], output: &mut [Sample]) {
    scalar::complex_power(interleaved, output)
}
#[cfg(not(target_arch = "aarch64"))]
fn complex_multiply_neon(a: &[Sample], b: &[Sample], output: &mut [Sample]) {
    scalar::complex_multiply(a, b, output)
}

// ============ Convenience Functions ============

/// Full-wave rectify in place using best available SIMD
#[inline]
pub fn abs_inplace(buffer: &mut [Sample]) {
    (KernelDispatch::get().abs_inplace)(buffer)
}

/// Half-wave rectify in place using best available SIMD
#[inline]
pub fn half_rectify_inplace(buffer: &mut [Sample]) {
    (KernelDispatch::get().half_rectify_inplace)(buffer)
}

/// Sum with double-precision accumulation using best available SIMD
#[inline]
pub fn sum(buffer: &[Sample]) -> f64 {
    (KernelDispatch::get().sum)(buffer)
}

/// Sum of squares with double-precision accumulation using best available SIMD
#[inline]
pub fn sum_of_squares(buffer: &[Sample]) -> f64 {
    (KernelDispatch::get().sum_of_squares)(buffer)
}

/// Elementwise multiply by a window using best available SIMD
#[inline]
pub fn apply_window(input: &[Sample], window: &[Sample], output: &mut [Sample]) {
    (KernelDispatch::get().apply_window)(input, window, output)
}

/// Inner product using best available SIMD
#[inline]
pub fn dot_product(a: &[Sample], b: &[Sample]) -> Sample {
    (KernelDispatch::get().dot_product)(a, b)
}

/// Magnitude of interleaved complex pairs using best available SIMD
#[inline]
pub fn complex_magnitude(interleaved: &[Sample], output: &mut [Sample]) {
    (KernelDispatch::get().complex_magnitude)(interleaved, output)
}

/// Squared magnitude of interleaved complex pairs using best available SIMD
#[inline]
pub fn complex_power(interleaved: &[Sample], output: &mut [Sample]) {
    (KernelDispatch::get().complex_power)(interleaved, output)
}

/// Product of interleaved complex pairs using best available SIMD
#[inline]
pub fn complex_multiply(a: &[Sample], b: &[Sample], output: &mut [Sample]) {
    (KernelDispatch::get().complex_multiply)(a, b, output)
}

// ============ Tests ============
