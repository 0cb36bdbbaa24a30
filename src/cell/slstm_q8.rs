//! sLSTM cell, INT8.
//!
//! Storage: i8 weights and activations, i16 cell/normalizer, f32 stabilizer.
//! Compute: i8×i8 products accumulate in i32, the accumulators are scaled to
//! f32 for gating, and the updated states are requantized.

use crate::cell::scratch::QuantScratch;
use crate::cell::{check_state, clip, Dims, SeqShape};
use crate::error::{check_len, Result};
use crate::math::{sigmoid, stabilize_gates, NORMALIZER_FLOOR};
use crate::quant::{dot_i8, validate_scale, QuantParam};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlstmQ8Params {
    #[serde(default)]
    pub cell_clip: f32,
    /// Symmetric scale of W.
    pub w_scale: f32,
    /// Symmetric scale of R.
    pub r_scale: f32,
    pub x_quant: QuantParam,
    /// Hidden state and output.
    pub y_quant: QuantParam,
    /// Cell state, i16, zero point 0.
    pub c_quant: QuantParam,
    /// Normalizer, i16, zero point 0.
    pub n_quant: QuantParam,
}

impl SlstmQ8Params {
    pub fn validate(&self) -> Result<()> {
        validate_scale("W", self.w_scale)?;
        validate_scale("R", self.r_scale)?;
        self.x_quant.validate_i8("x")?;
        self.y_quant.validate_i8("y")?;
        self.c_quant.validate_state("c")?;
        self.n_quant.validate_state("n")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlstmQ8Weights<'a> {
    dims: Dims,
    /// [4H, I]
    pub w: &'a [i8],
    /// [4H, H]
    pub r: &'a [i8],
    /// [4H], in `w_scale * x_scale` units.
    pub b: &'a [i32],
}

impl<'a> SlstmQ8Weights<'a> {
    pub fn new(dims: Dims, w: &'a [i8], r: &'a [i8], b: &'a [i32]) -> Result<Self> {
        dims.validate_q8(true)?;
        let rows = dims.slstm_rows();
        check_len("W", w.len(), rows * dims.input_size)?;
        check_len("R", r.len(), rows * dims.hidden_size)?;
        check_len("b", b.len(), rows)?;
        Ok(Self { dims, w, r, b })
    }

    pub fn dims(&self) -> Dims { self.dims }
}

/// Mutable state view: y [batch, H] i8, c/n [batch, H] i16, m [batch, H] f32.
#[derive(Debug)]
pub struct SlstmQ8State<'s> {
    pub y: &'s mut [i8],
    pub c: &'s mut [i16],
    pub n: &'s mut [i16],
    pub m: &'s mut [f32],
}

impl<'s> SlstmQ8State<'s> {
    pub fn new(y: &'s mut [i8], c: &'s mut [i16], n: &'s mut [i16], m: &'s mut [f32]) -> Self {
        Self { y, c, n, m }
    }

    fn check(&self, batch: usize, h: usize) -> Result<()> {
        check_state(batch, &[
            ("y", self.y.len(), h),
            ("c", self.c.len(), h),
            ("n", self.n.len(), h),
            ("m", self.m.len(), h),
        ])
    }
}

/// Owned state. `zeros` starts y at code 0, which is only the real value 0
/// when `y_quant.zero_point == 0`; use `fresh` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SlstmQ8States {
    pub hidden_size: usize,
    pub y: Vec<i8>,
    pub c: Vec<i16>,
    pub n: Vec<i16>,
    pub m: Vec<f32>,
}

impl SlstmQ8States {
    pub fn zeros(batch: usize, hidden_size: usize) -> Self {
        let len = batch * hidden_size;
        Self { hidden_size, y: vec![0; len], c: vec![0; len], n: vec![0; len], m: vec![0.0; len] }
    }

    /// Fresh state whose hidden vector encodes the real value 0.
    pub fn fresh(batch: usize, hidden_size: usize, y_quant: &QuantParam) -> Self {
        let mut s = Self::zeros(batch, hidden_size);
        s.y.fill(y_quant.quantize_i8(0.0));
        s
    }

    pub fn batch_size(&self) -> usize { self.y.len() / self.hidden_size.max(1) }

    pub fn view(&mut self) -> SlstmQ8State<'_> {
        SlstmQ8State::new(&mut self.y, &mut self.c, &mut self.n, &mut self.m)
    }

    /// Back to the fresh state; zeroed `n` codes re-seed the stabilizer.
    pub fn reset(&mut self, y_quant: &QuantParam) {
        self.y.fill(y_quant.quantize_i8(0.0));
        self.c.fill(0);
        self.n.fill(0);
        self.m.fill(0.0);
    }
}

pub fn step_q8(
    weights: &SlstmQ8Weights<'_>,
    x: &[i8],
    state: &mut SlstmQ8State<'_>,
    scratch: &mut QuantScratch,
    params: &SlstmQ8Params,
) -> Result<()> {
    let dims = weights.dims;
    params.validate()?;
    check_len("x", x.len(), dims.input_size)?;
    state.check(1, dims.hidden_size)?;
    let (acc, pre) = scratch.rows(dims.slstm_rows())?;
    step_element(weights, x, state.y, state.c, state.n, state.m, acc, pre, params);
    Ok(())
}

/// Runs `input` [batch, time, I] (i8) through the cell, writing `output`
/// [batch, time, H] (i8).
pub fn eval_q8(
    weights: &SlstmQ8Weights<'_>,
    input: &[i8],
    seq: SeqShape,
    state: &mut SlstmQ8State<'_>,
    output: &mut [i8],
    scratch: &mut QuantScratch,
    params: &SlstmQ8Params,
) -> Result<()> {
    let dims = weights.dims;
    params.validate()?;
    seq.check_io(&dims, input.len(), output.len())?;
    state.check(seq.batch, dims.hidden_size)?;
    let (acc, pre) = scratch.rows(dims.slstm_rows())?;
    if seq.is_empty() { return Ok(()); }

    let (i, h) = (dims.input_size, dims.hidden_size);
    let elems = input
        .chunks_exact(seq.time * i)
        .zip(output.chunks_exact_mut(seq.time * h))
        .zip(state.y.chunks_exact_mut(h).zip(state.c.chunks_exact_mut(h)))
        .zip(state.n.chunks_exact_mut(h).zip(state.m.chunks_exact_mut(h)));
    for (((x_seq, out_seq), (y, c)), (n, m)) in elems {
        run_element(weights, x_seq, out_seq, y, c, n, m, acc, pre, params);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn run_element(
    weights: &SlstmQ8Weights<'_>,
    x_seq: &[i8],
    out_seq: &mut [i8],
    y: &mut [i8],
    c: &mut [i16],
    n: &mut [i16],
    m: &mut [f32],
    acc: &mut [i32],
    pre: &mut [f32],
    params: &SlstmQ8Params,
) {
    let (i, h) = (weights.dims.input_size, weights.dims.hidden_size);
    for (x_t, out_t) in x_seq.chunks_exact(i).zip(out_seq.chunks_exact_mut(h)) {
        step_element(weights, x_t, y, c, n, m, acc, pre, params);
        out_t.copy_from_slice(y);
    }
}

#[allow(clippy::too_many_arguments)]
fn step_element(
    weights: &SlstmQ8Weights<'_>,
    x: &[i8],
    y: &mut [i8],
    c: &mut [i16],
    n: &mut [i16],
    m: &mut [f32],
    acc: &mut [i32],
    pre: &mut [f32],
    p: &SlstmQ8Params,
) {
    let (i, h) = (weights.dims.input_size, weights.dims.hidden_size);
    // bias shares the input projection's scale
    let wx_scale = p.w_scale * p.x_quant.scale;
    let ry_scale = p.r_scale * p.y_quant.scale;
    let (x_zp, y_zp) = (p.x_quant.zero_point, p.y_quant.zero_point);

    for row in 0..pre.len() {
        acc[row] = dot_i8(&weights.w[row * i..(row + 1) * i], x, x_zp);
        let acc_ry = dot_i8(&weights.r[row * h..(row + 1) * h], y, y_zp);
        pre[row] = acc[row] as f32 * wx_scale + acc_ry as f32 * ry_scale + weights.b[row] as f32 * wx_scale;
    }

    let (i_raw, rest) = pre.split_at(h);
    let (f_raw, rest) = rest.split_at(h);
    let (z_raw, o_raw) = rest.split_at(h);
    for u in 0..h {
        let c_prev = p.c_quant.dequantize(c[u] as i32);
        let n_prev = p.n_quant.dequantize(n[u] as i32);

        let g = stabilize_gates(i_raw[u], f_raw[u], m[u], n[u] == 0);
        let o_gate = sigmoid(o_raw[u]);
        let c_input = z_raw[u].tanh();

        let c_new = clip(p.cell_clip, g.f_gate * c_prev + g.i_gate * c_input);
        let n_new = g.f_gate * n_prev + g.i_gate;
        let y_new = o_gate * (c_new / n_new.max(NORMALIZER_FLOOR));

        c[u] = p.c_quant.quantize_i16(c_new);
        n[u] = p.n_quant.quantize_i16(n_new);
        m[u] = g.m;
        y[u] = p.y_quant.quantize_i8(y_new);
    }
}
