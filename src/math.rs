//! Scalar math shared by both cells.

/// Floor applied to the sLSTM normalizer before dividing.
pub const NORMALIZER_FLOOR: f32 = 1e-6;

/// Added to the mLSTM output denominator.
pub const DENOM_EPS: f32 = 1e-6;

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// log(sigmoid(x)) = -softplus(-x), split on the sign of x so `exp` never
/// sees a large positive argument.
#[inline]
pub fn log_sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

/// Exponential gates after the max-trick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizedGates {
    /// New stabilizer value.
    pub m: f32,
    pub i_gate: f32,
    pub f_gate: f32,
}

/// Stabilize input/forget gates in log space.
///
/// `m = max(i_raw, m_prev + log_sigmoid(f_raw))`, or `m = i_raw` when
/// `first_step` is set. Both exponentials then take a non-positive argument,
/// and the gates are clamped to 1 for the first-step case where the forget
/// term may exceed `i_raw`.
#[inline]
pub fn stabilize_gates(i_raw: f32, f_raw: f32, m_prev: f32, first_step: bool) -> StabilizedGates {
    let log_f_plus_m = m_prev + log_sigmoid(f_raw);
    let m = if first_step { i_raw } else { i_raw.max(log_f_plus_m) };
    StabilizedGates {
        m,
        i_gate: (i_raw - m).exp().min(1.0),
        f_gate: (log_f_plus_m - m).exp().min(1.0),
    }
}
