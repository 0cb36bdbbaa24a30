//! Quantization parameters, calibration and scalar integer kernels.
//!
//! Convention: `real = scale * (q - zero_point)`.
use crate::error::{Result, XlstmError};
use log::debug;
use serde::{Deserialize, Serialize};

pub const QMAX_I8: f32 = 127.0;
pub const QMAX_I16: f32 = 32767.0;

/// Ranges narrower than this calibrate to the fallback asymmetric scale.
const MIN_RANGE: f32 = 1e-10;

/// Per-tensor (scale, zero_point) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParam {
    pub scale: f32,
    pub zero_point: i32,
}

impl Default for QuantParam {
    fn default() -> Self { Self { scale: 1.0, zero_point: 0 } }
}

impl QuantParam {
    pub const fn new(scale: f32, zero_point: i32) -> Self { Self { scale, zero_point } }

    /// Zero-point-free parameter, as used for weights and 16-bit states.
    pub const fn symmetric_scale(scale: f32) -> Self { Self { scale, zero_point: 0 } }

    /// Symmetric 8-bit calibration: `scale = max|data| / 127`, zero point 0.
    pub fn symmetric(data: &[f32]) -> Self { Self::symmetric_with(data, QMAX_I8) }

    /// Symmetric 16-bit calibration for cell/normalizer states.
    pub fn symmetric_i16(data: &[f32]) -> Self { Self::symmetric_with(data, QMAX_I16) }

    /// Symmetric calibration against an explicit integer maximum.
    pub fn symmetric_with(data: &[f32], qmax: f32) -> Self {
        let max_abs = data.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        Self::from_max_abs(max_abs, qmax)
    }

    pub fn from_max_abs(max_abs: f32, qmax: f32) -> Self {
        let scale = if max_abs > 0.0 { max_abs / qmax } else { 1.0 };
        Self { scale, zero_point: 0 }
    }

    /// Asymmetric 8-bit calibration over a sample.
    ///
    /// The observed range is widened to contain zero so zero padding stays
    /// exactly representable.
    pub fn asymmetric(data: &[f32]) -> Self {
        let (min, max) = data
            .iter()
            .fold((0.0f32, 0.0f32), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Self::from_range(min, max)
    }

    /// Asymmetric 8-bit parameters for a known `[min, max]` range.
    pub fn from_range(min: f32, max: f32) -> Self {
        let min = min.min(0.0);
        let max = max.max(0.0);
        let range = max - min;
        if range < MIN_RANGE {
            return Self { scale: 1.0 / 255.0, zero_point: 0 };
        }
        let scale = range / 255.0;
        let zero_point = (-128.0 - min / scale).round().clamp(-128.0, 127.0) as i32;
        Self { scale, zero_point }
    }

    #[inline]
    fn code(&self, v: f32) -> f32 { (v / self.scale).round() + self.zero_point as f32 }

    #[inline]
    pub fn quantize_i8(&self, v: f32) -> i8 { self.code(v).clamp(-128.0, 127.0) as i8 }

    #[inline]
    pub fn quantize_i16(&self, v: f32) -> i16 { self.code(v).clamp(-32768.0, 32767.0) as i16 }

    #[inline]
    pub fn quantize_i32(&self, v: f32) -> i32 { self.code(v).clamp(i32::MIN as f32, i32::MAX as f32) as i32 }

    #[inline]
    pub fn dequantize(&self, q: i32) -> f32 { self.scale * (q as f32 - self.zero_point as f32) }

    pub(crate) fn validate(&self, name: &'static str) -> Result<()> {
        if self.scale.is_finite() && self.scale > 0.0 {
            Ok(())
        } else {
            Err(XlstmError::InvalidScale { name, scale: self.scale })
        }
    }

    /// Validates an 8-bit activation parameter.
    pub(crate) fn validate_i8(&self, name: &'static str) -> Result<()> {
        self.validate(name)?;
        if (-128..=127).contains(&self.zero_point) {
            Ok(())
        } else {
            Err(XlstmError::ZeroPointRange { name, zero_point: self.zero_point })
        }
    }

    /// Validates a 16-bit symmetric state parameter.
    pub(crate) fn validate_state(&self, name: &'static str) -> Result<()> {
        self.validate(name)?;
        if self.zero_point == 0 {
            Ok(())
        } else {
            Err(XlstmError::StateZeroPoint { name, zero_point: self.zero_point })
        }
    }
}

pub(crate) fn validate_scale(name: &'static str, scale: f32) -> Result<()> {
    QuantParam::symmetric_scale(scale).validate(name)
}

pub fn quantize_slice_i8(src: &[f32], dst: &mut [i8], qp: &QuantParam) {
    for (d, &s) in dst.iter_mut().zip(src) { *d = qp.quantize_i8(s); }
}

pub fn quantize_slice_i16(src: &[f32], dst: &mut [i16], qp: &QuantParam) {
    for (d, &s) in dst.iter_mut().zip(src) { *d = qp.quantize_i16(s); }
}

pub fn quantize_slice_i32(src: &[f32], dst: &mut [i32], qp: &QuantParam) {
    for (d, &s) in dst.iter_mut().zip(src) { *d = qp.quantize_i32(s); }
}

pub fn dequantize_slice_i8(src: &[i8], dst: &mut [f32], qp: &QuantParam) {
    for (d, &s) in dst.iter_mut().zip(src) { *d = qp.dequantize(s as i32); }
}

pub fn dequantize_slice_i16(src: &[i16], dst: &mut [f32], qp: &QuantParam) {
    for (d, &s) in dst.iter_mut().zip(src) { *d = qp.dequantize(s as i32); }
}

/// Quantize into a fresh vector, calibrating symmetrically first.
pub fn quantize_symmetric_i8(src: &[f32]) -> (Vec<i8>, QuantParam) {
    let qp = QuantParam::symmetric(src);
    let mut out = vec![0i8; src.len()];
    quantize_slice_i8(src, &mut out, &qp);
    debug!("symmetric i8: {} values, scale={:e}", src.len(), qp.scale);
    (out, qp)
}

/// Longest row `dot_i8` accumulates without leaving i32: each term is at most
/// 128 * 255 in magnitude.
pub const MAX_DOT_LEN: usize = (i32::MAX / (128 * 255)) as usize;

/// Integer dot product of a weight row against activations with zero point
/// `zp` removed. Products are widened to i32 before accumulation; rows longer
/// than [`MAX_DOT_LEN`] wrap instead of panicking.
#[inline]
pub fn dot_i8(w_row: &[i8], x: &[i8], zp: i32) -> i32 {
    let mut acc: i32 = 0;
    for i in 0..w_row.len() { acc = acc.wrapping_add((w_row[i] as i32) * (x[i] as i32 - zp)); }
    acc
}
