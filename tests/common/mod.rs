#![allow(dead_code)]

use xlstm_kernels::cell::mlstm::{self, MlstmStates, MlstmWeights};
use xlstm_kernels::cell::prepare::{Calibration, QuantizedMlstm, QuantizedSlstm};
use xlstm_kernels::cell::slstm::{self, SlstmStates, SlstmWeights};
use xlstm_kernels::{CellParams, Dims, QuantParam, Scratch, SeqShape};

pub const TOL: f32 = 1e-5;

// sLSTM, I=2, H=2, zero bias
pub const SLSTM_W: [f32; 16] = [
    0.96345764, 0.74364203, 0.45035860, -1.05276048, 0.33920923, -0.61727244, -0.02153374, -0.80233347,
    -0.37606764, 0.82436150, -0.19623932, -0.70180357, -0.36394066, -0.27971509, -0.38441944, 0.38122270,
];
pub const SLSTM_R: [f32; 16] = [
    0.82115847, -0.07979874, -0.24869877, 0.21979463, -0.37906557, 0.53915882, 0.40040028, 0.84031028,
    0.63956219, 0.64821142, 0.30523324, 0.66736889, -0.11581216, 0.02087975, -0.12578765, 0.42992926,
];
pub const SLSTM_B: [f32; 8] = [0.0; 8];
pub const SLSTM_SEQ: [f32; 6] = [1.0, 0.5, 0.3, -0.2, -0.5, 1.0];
pub const SLSTM_SEQ_OUT: [f32; 6] = [0.01359604, -0.22511525, -0.05999865, -0.07478932, 0.16812575, -0.20084262];

// mLSTM, I=3, H=2, zero bias
pub const MLSTM_W: [f32; 30] = [
    0.16868509, -0.08888861, -0.15176380, -0.29400593, 0.17430259, 0.33017048, -0.10981881, -0.18958491,
    0.38355353, -0.59625101, 0.34917596, -0.70486146, 0.08968981, 0.94757402, 0.68445408, -0.80163509,
    -0.66247869, 0.08921422, -1.06687653, 0.52617890, -0.19424154, -0.46717295, 0.91594690, -0.16891940,
    0.44027215, 0.77707928, 0.31330803, -0.08774360, 0.04914189, -0.04675372,
];
pub const MLSTM_B: [f32; 10] = [0.0; 10];
pub const MLSTM_SEQ: [f32; 9] = [1.0, 0.5, -0.3, 0.3, -0.2, 0.8, -0.5, 1.0, 0.1];
pub const MLSTM_SEQ_OUT: [f32; 6] = [0.00081466, -0.00190351, -0.01144831, 0.00183737, 0.25203866, -0.05591988];

/// sLSTM weights driving both exponential gates to 100.
pub fn slstm_large() -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let mut w = vec![5.0f32; 8];
    w.extend([0.5f32; 8]);
    (w, vec![0.0; 16], vec![0.0; 8])
}

/// mLSTM weights with i/f pre-activations of 150 on an input of all 10s.
pub fn mlstm_large() -> (Vec<f32>, Vec<f32>) {
    let mut w = vec![0.5f32; 18];
    w.extend([5.0f32; 6]);
    w.extend([0.5f32; 6]);
    (w, vec![0.0; 10])
}

pub fn assert_close(actual: &[f32], expected: &[f32], tol: f32, what: &str) {
    assert_eq!(actual.len(), expected.len(), "{what}: length");
    for (k, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol, "{what}[{k}]: got {a}, expected {e} (tol {tol})");
    }
}

pub fn assert_all_finite(values: &[f32], what: &str) {
    for (k, v) in values.iter().enumerate() {
        assert!(v.is_finite(), "{what}[{k}] = {v}");
    }
}

pub fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).fold(0.0f32, |m, (x, y)| m.max((x - y).abs()))
}

pub fn dequant_i16(q: &[i16], qp: &QuantParam) -> Vec<f32> {
    q.iter().map(|&v| qp.dequantize(v as i32)).collect()
}

pub fn dequant_i8(q: &[i8], qp: &QuantParam) -> Vec<f32> {
    q.iter().map(|&v| qp.dequantize(v as i32)).collect()
}

/// Float sLSTM over one sequence of `input.len() / I` steps from fresh state.
pub fn run_slstm(dims: Dims, w: &[f32], r: &[f32], b: &[f32], input: &[f32]) -> (SlstmStates, Vec<f32>) {
    let weights = SlstmWeights::new(dims, w, r, b).unwrap();
    let seq = SeqShape::new(1, input.len() / dims.input_size);
    let mut states = SlstmStates::zeros(1, dims.hidden_size);
    let mut out = vec![0.0; seq.time * dims.hidden_size];
    let mut scratch = Scratch::for_slstm(&dims);
    slstm::eval_f32(&weights, input, seq, &mut states.view(), &mut out, &mut scratch, &CellParams::default()).unwrap();
    (states, out)
}

pub fn run_mlstm(dims: Dims, w: &[f32], b: &[f32], input: &[f32]) -> (MlstmStates, Vec<f32>) {
    let weights = MlstmWeights::new(dims, w, b).unwrap();
    let seq = SeqShape::new(1, input.len() / dims.input_size);
    let mut states = MlstmStates::zeros(1, dims.hidden_size);
    let mut out = vec![0.0; seq.time * dims.hidden_size];
    let mut scratch = Scratch::for_mlstm(&dims);
    mlstm::eval_f32(&weights, input, seq, &mut states.view(), &mut out, &mut scratch, &CellParams::default()).unwrap();
    (states, out)
}

/// INT8 sLSTM with symmetric weights, input calibrated from `input` and
/// fixed symmetric state scales.
pub fn quantize_slstm(dims: Dims, w: &[f32], r: &[f32], b: &[f32], input: &[f32], y_scale: f32) -> QuantizedSlstm {
    let weights = SlstmWeights::new(dims, w, r, b).unwrap();
    let cal = Calibration::with_fixed_states(input, y_scale, 0.01, 0.01);
    QuantizedSlstm::from_f32(&weights, &cal, 0.0).unwrap()
}

pub fn quantize_mlstm(dims: Dims, w: &[f32], b: &[f32], input: &[f32], y_scale: f32) -> QuantizedMlstm {
    let weights = MlstmWeights::new(dims, w, b).unwrap();
    let cal = Calibration::with_fixed_states(input, y_scale, 0.01, 0.01);
    QuantizedMlstm::from_f32(&weights, &cal, 0.0).unwrap()
}
