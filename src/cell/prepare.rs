//! Turning float cells into INT8 cells: weight quantization and state-scale
//! calibration from a float run over sample data.

use crate::cell::mlstm::{self, MlstmStates, MlstmWeights};
use crate::cell::mlstm_q8::{MlstmQ8Params, MlstmQ8States, MlstmQ8Weights};
use crate::cell::scratch::Scratch;
use crate::cell::slstm::{self, SlstmStates, SlstmWeights};
use crate::cell::slstm_q8::{SlstmQ8Params, SlstmQ8States, SlstmQ8Weights};
use crate::cell::{CellParams, Dims, SeqShape};
use crate::error::Result;
use crate::quant::{
    dequantize_slice_i8, quantize_slice_i32, quantize_slice_i8, quantize_symmetric_i8, QuantParam, QMAX_I16,
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Activation and state quantization parameters for one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub x_quant: QuantParam,
    pub y_quant: QuantParam,
    pub c_quant: QuantParam,
    pub n_quant: QuantParam,
}

impl Calibration {
    /// Input calibrated from `input`, fixed symmetric state scales.
    pub fn with_fixed_states(input: &[f32], y_scale: f32, c_scale: f32, n_scale: f32) -> Self {
        Self {
            x_quant: QuantParam::asymmetric(input),
            y_quant: QuantParam::symmetric_scale(y_scale),
            c_quant: QuantParam::symmetric_scale(c_scale),
            n_quant: QuantParam::symmetric_scale(n_scale),
        }
    }
}

/// Running extrema of the float trajectory.
#[derive(Debug, Default)]
struct RangeTracker {
    y_min: f32,
    y_max: f32,
    c_abs: f32,
    n_abs: f32,
}

impl RangeTracker {
    fn observe(&mut self, y: &[f32], c: &[f32], n: &[f32]) {
        for &v in y {
            self.y_min = self.y_min.min(v);
            self.y_max = self.y_max.max(v);
        }
        self.c_abs = c.iter().fold(self.c_abs, |a, v| a.max(v.abs()));
        self.n_abs = n.iter().fold(self.n_abs, |a, v| a.max(v.abs()));
    }

    fn finish(self, input: &[f32]) -> Calibration {
        Calibration {
            x_quant: QuantParam::asymmetric(input),
            y_quant: QuantParam::from_range(self.y_min, self.y_max),
            c_quant: QuantParam::from_max_abs(self.c_abs, QMAX_I16),
            n_quant: QuantParam::from_max_abs(self.n_abs, QMAX_I16),
        }
    }
}

/// Runs the float sLSTM over `input` [batch, time, I] from fresh state and
/// derives quantization parameters from what it observes at every step.
pub fn calibrate_slstm(
    weights: &SlstmWeights<'_>,
    input: &[f32],
    seq: SeqShape,
    params: &CellParams,
) -> Result<Calibration> {
    let dims = weights.dims();
    seq.check_io(&dims, input.len(), seq.batch * seq.time * dims.hidden_size)?;
    let mut scratch = Scratch::for_slstm(&dims);
    let mut tracker = RangeTracker::default();
    for x_t_seq in input.chunks_exact(dims.input_size * seq.time.max(1)).take(seq.batch) {
        let mut states = SlstmStates::zeros(1, dims.hidden_size);
        for x_t in x_t_seq.chunks_exact(dims.input_size) {
            slstm::step_f32(weights, x_t, &mut states.view(), &mut scratch, params)?;
            tracker.observe(&states.y, &states.c, &states.n);
        }
    }
    let cal = tracker.finish(input);
    debug!("calibrated sLSTM: {:?}", cal);
    Ok(cal)
}

/// mLSTM counterpart of [`calibrate_slstm`].
pub fn calibrate_mlstm(
    weights: &MlstmWeights<'_>,
    input: &[f32],
    seq: SeqShape,
    params: &CellParams,
) -> Result<Calibration> {
    let dims = weights.dims();
    seq.check_io(&dims, input.len(), seq.batch * seq.time * dims.hidden_size)?;
    let mut scratch = Scratch::for_mlstm(&dims);
    let mut tracker = RangeTracker::default();
    for x_t_seq in input.chunks_exact(dims.input_size * seq.time.max(1)).take(seq.batch) {
        let mut states = MlstmStates::zeros(1, dims.hidden_size);
        for x_t in x_t_seq.chunks_exact(dims.input_size) {
            mlstm::step_f32(weights, x_t, &mut states.view(), &mut scratch, params)?;
            tracker.observe(&states.y, &states.c, &states.n);
        }
    }
    let cal = tracker.finish(input);
    debug!("calibrated mLSTM: {:?}", cal);
    Ok(cal)
}

/// Bias in the combined `w_scale * x_scale` units the kernels expect.
fn quantize_bias(b: &[f32], w_scale: f32, x_quant: &QuantParam) -> Vec<i32> {
    let qp = QuantParam::symmetric_scale(w_scale * x_quant.scale);
    let mut out = vec![0i32; b.len()];
    quantize_slice_i32(b, &mut out, &qp);
    out
}

fn quantize_input(x: &[f32], x_quant: &QuantParam) -> Vec<i8> {
    let mut out = vec![0i8; x.len()];
    quantize_slice_i8(x, &mut out, x_quant);
    out
}

fn dequantize_output(q: &[i8], y_quant: &QuantParam) -> Vec<f32> {
    let mut out = vec![0f32; q.len()];
    dequantize_slice_i8(q, &mut out, y_quant);
    out
}

/// Owned INT8 sLSTM: quantized weights plus the parameters to run them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedSlstm {
    pub dims: Dims,
    pub params: SlstmQ8Params,
    pub w: Vec<i8>,
    pub r: Vec<i8>,
    pub b: Vec<i32>,
}

impl QuantizedSlstm {
    pub fn from_f32(weights: &SlstmWeights<'_>, cal: &Calibration, cell_clip: f32) -> Result<Self> {
        let (w, w_qp) = quantize_symmetric_i8(weights.w);
        let (r, r_qp) = quantize_symmetric_i8(weights.r);
        let b = quantize_bias(weights.b, w_qp.scale, &cal.x_quant);
        let params = SlstmQ8Params {
            cell_clip,
            w_scale: w_qp.scale,
            r_scale: r_qp.scale,
            x_quant: cal.x_quant,
            y_quant: cal.y_quant,
            c_quant: cal.c_quant,
            n_quant: cal.n_quant,
        };
        params.validate()?;
        debug!("quantized sLSTM {:?}: w_scale={:e} r_scale={:e}", weights.dims(), params.w_scale, params.r_scale);
        Ok(Self { dims: weights.dims(), params, w, r, b })
    }

    pub fn weights(&self) -> Result<SlstmQ8Weights<'_>> {
        SlstmQ8Weights::new(self.dims, &self.w, &self.r, &self.b)
    }

    pub fn fresh_states(&self, batch: usize) -> SlstmQ8States {
        SlstmQ8States::fresh(batch, self.dims.hidden_size, &self.params.y_quant)
    }

    pub fn quantize_input(&self, x: &[f32]) -> Vec<i8> { quantize_input(x, &self.params.x_quant) }

    pub fn dequantize_output(&self, q: &[i8]) -> Vec<f32> { dequantize_output(q, &self.params.y_quant) }
}

/// Owned INT8 mLSTM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedMlstm {
    pub dims: Dims,
    pub params: MlstmQ8Params,
    pub w: Vec<i8>,
    pub b: Vec<i32>,
}

impl QuantizedMlstm {
    pub fn from_f32(weights: &MlstmWeights<'_>, cal: &Calibration, cell_clip: f32) -> Result<Self> {
        let (w, w_qp) = quantize_symmetric_i8(weights.w);
        let b = quantize_bias(weights.b, w_qp.scale, &cal.x_quant);
        let params = MlstmQ8Params {
            cell_clip,
            w_scale: w_qp.scale,
            x_quant: cal.x_quant,
            y_quant: cal.y_quant,
            c_quant: cal.c_quant,
            n_quant: cal.n_quant,
        };
        params.validate()?;
        debug!("quantized mLSTM {:?}: w_scale={:e}", weights.dims(), params.w_scale);
        Ok(Self { dims: weights.dims(), params, w, b })
    }

    pub fn weights(&self) -> Result<MlstmQ8Weights<'_>> {
        MlstmQ8Weights::new(self.dims, &self.w, &self.b)
    }

    pub fn fresh_states(&self, batch: usize) -> MlstmQ8States {
        MlstmQ8States::fresh(batch, self.dims.hidden_size, &self.params.y_quant)
    }

    pub fn quantize_input(&self, x: &[f32]) -> Vec<i8> { quantize_input(x, &self.params.x_quant) }

    pub fn dequantize_output(&self, q: &[i8]) -> Vec<f32> { dequantize_output(q, &self.params.y_quant) }
}
