//! mLSTM cell, INT8.
//!
//! Storage: i8 weights and activations, i16 memory matrix and normalizer,
//! f32 scalar stabilizer. The output is read from the requantized memory so
//! it reflects exactly what the next step will see.

use crate::cell::mlstm::{output_denominator, split_projections, Projections};
use crate::cell::scratch::QuantScratch;
use crate::cell::{check_state, clip, Dims, SeqShape};
use crate::error::{check_len, Result};
use crate::math::sigmoid;
use crate::quant::{dot_i8, validate_scale, QuantParam};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MlstmQ8Params {
    #[serde(default)]
    pub cell_clip: f32,
    /// Symmetric scale of W.
    pub w_scale: f32,
    pub x_quant: QuantParam,
    pub y_quant: QuantParam,
    /// Memory matrix, i16, zero point 0.
    pub c_quant: QuantParam,
    /// Normalizer, i16, zero point 0.
    pub n_quant: QuantParam,
}

impl MlstmQ8Params {
    pub fn validate(&self) -> Result<()> {
        validate_scale("W", self.w_scale)?;
        self.x_quant.validate_i8("x")?;
        self.y_quant.validate_i8("y")?;
        self.c_quant.validate_state("C")?;
        self.n_quant.validate_state("n")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MlstmQ8Weights<'a> {
    dims: Dims,
    /// [4H+2, I]
    pub w: &'a [i8],
    /// [4H+2], in `w_scale * x_scale` units.
    pub b: &'a [i32],
}

impl<'a> MlstmQ8Weights<'a> {
    pub fn new(dims: Dims, w: &'a [i8], b: &'a [i32]) -> Result<Self> {
        dims.validate_q8(false)?;
        let rows = dims.mlstm_rows();
        check_len("W", w.len(), rows * dims.input_size)?;
        check_len("b", b.len(), rows)?;
        Ok(Self { dims, w, b })
    }

    pub fn dims(&self) -> Dims { self.dims }
}

/// Mutable state view: y [batch, H] i8, C [batch, H*H] i16, n [batch, H] i16,
/// m [batch] f32.
#[derive(Debug)]
pub struct MlstmQ8State<'s> {
    pub y: &'s mut [i8],
    pub c: &'s mut [i16],
    pub n: &'s mut [i16],
    pub m: &'s mut [f32],
}

impl<'s> MlstmQ8State<'s> {
    pub fn new(y: &'s mut [i8], c: &'s mut [i16], n: &'s mut [i16], m: &'s mut [f32]) -> Self {
        Self { y, c, n, m }
    }

    fn check(&self, batch: usize, h: usize) -> Result<()> {
        check_state(batch, &[
            ("y", self.y.len(), h),
            ("C", self.c.len(), h * h),
            ("n", self.n.len(), h),
            ("m", self.m.len(), 1),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MlstmQ8States {
    pub hidden_size: usize,
    pub y: Vec<i8>,
    pub c: Vec<i16>,
    pub n: Vec<i16>,
    pub m: Vec<f32>,
}

impl MlstmQ8States {
    pub fn zeros(batch: usize, hidden_size: usize) -> Self {
        let h = hidden_size;
        Self { hidden_size, y: vec![0; batch * h], c: vec![0; batch * h * h], n: vec![0; batch * h], m: vec![0.0; batch] }
    }

    pub fn fresh(batch: usize, hidden_size: usize, y_quant: &QuantParam) -> Self {
        let mut s = Self::zeros(batch, hidden_size);
        s.y.fill(y_quant.quantize_i8(0.0));
        s
    }

    pub fn batch_size(&self) -> usize { self.m.len() }

    pub fn view(&mut self) -> MlstmQ8State<'_> {
        MlstmQ8State::new(&mut self.y, &mut self.c, &mut self.n, &mut self.m)
    }

    pub fn reset(&mut self, y_quant: &QuantParam) {
        self.y.fill(y_quant.quantize_i8(0.0));
        self.c.fill(0);
        self.n.fill(0);
        self.m.fill(0.0);
    }
}

pub fn step_q8(
    weights: &MlstmQ8Weights<'_>,
    x: &[i8],
    state: &mut MlstmQ8State<'_>,
    scratch: &mut QuantScratch,
    params: &MlstmQ8Params,
) -> Result<()> {
    let dims = weights.dims;
    params.validate()?;
    check_len("x", x.len(), dims.input_size)?;
    state.check(1, dims.hidden_size)?;
    let (acc, pre) = scratch.rows(dims.mlstm_rows())?;
    step_element(weights, x, state.y, state.c, state.n, &mut state.m[0], acc, pre, params);
    Ok(())
}

/// Runs `input` [batch, time, I] (i8) through the cell, writing `output`
/// [batch, time, H] (i8).
pub fn eval_q8(
    weights: &MlstmQ8Weights<'_>,
    input: &[i8],
    seq: SeqShape,
    state: &mut MlstmQ8State<'_>,
    output: &mut [i8],
    scratch: &mut QuantScratch,
    params: &MlstmQ8Params,
) -> Result<()> {
    let dims = weights.dims;
    params.validate()?;
    seq.check_io(&dims, input.len(), output.len())?;
    state.check(seq.batch, dims.hidden_size)?;
    let (acc, pre) = scratch.rows(dims.mlstm_rows())?;
    if seq.is_empty() { return Ok(()); }

    let (i, h) = (dims.input_size, dims.hidden_size);
    let elems = input
        .chunks_exact(seq.time * i)
        .zip(output.chunks_exact_mut(seq.time * h))
        .zip(state.y.chunks_exact_mut(h).zip(state.c.chunks_exact_mut(h * h)))
        .zip(state.n.chunks_exact_mut(h).zip(state.m.iter_mut()));
    for (((x_seq, out_seq), (y, c)), (n, m)) in elems {
        run_element(weights, x_seq, out_seq, y, c, n, m, acc, pre, params);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn run_element(
    weights: &MlstmQ8Weights<'_>,
    x_seq: &[i8],
    out_seq: &mut [i8],
    y: &mut [i8],
    c: &mut [i16],
    n: &mut [i16],
    m: &mut f32,
    acc: &mut [i32],
    pre: &mut [f32],
    params: &MlstmQ8Params,
) {
    let (i, h) = (weights.dims.input_size, weights.dims.hidden_size);
    for (x_t, out_t) in x_seq.chunks_exact(i).zip(out_seq.chunks_exact_mut(h)) {
        step_element(weights, x_t, y, c, n, m, acc, pre, params);
        out_t.copy_from_slice(y);
    }
}

#[allow(clippy::too_many_arguments)]
fn step_element(
    weights: &MlstmQ8Weights<'_>,
    x: &[i8],
    y: &mut [i8],
    c: &mut [i16],
    n: &mut [i16],
    m: &mut f32,
    acc: &mut [i32],
    pre: &mut [f32],
    p: &MlstmQ8Params,
) {
    let (i, h) = (weights.dims.input_size, weights.dims.hidden_size);
    let wx_scale = p.w_scale * p.x_quant.scale;
    let x_zp = p.x_quant.zero_point;

    for row in 0..pre.len() {
        acc[row] = dot_i8(&weights.w[row * i..(row + 1) * i], x, x_zp);
        pre[row] = acc[row] as f32 * wx_scale + weights.b[row] as f32 * wx_scale;
    }

    let Projections { q, k, v, o, gates: g } = split_projections(pre, h, *m);
    let (cq, nq) = (p.c_quant, p.n_quant);

    for (row, &kr) in c.chunks_exact_mut(h).zip(k) {
        for (cell, &vc) in row.iter_mut().zip(v) {
            let c_new = g.f_gate * cq.dequantize(*cell as i32) + g.i_gate * kr * vc;
            *cell = cq.quantize_i16(clip(p.cell_clip, c_new));
        }
    }
    for (nv, &kv) in n.iter_mut().zip(k) {
        *nv = nq.quantize_i16(g.f_gate * nq.dequantize(*nv as i32) + g.i_gate * kv);
    }
    *m = g.m;

    let qn: f32 = q.iter().zip(n.iter()).map(|(&a, &b)| a * nq.dequantize(b as i32)).sum();
    let denom = output_denominator(qn, g.m);
    for (j, yj) in y.iter_mut().enumerate() {
        let mut qc = 0.0f32;
        for (r, &qr) in q.iter().enumerate() { qc += qr * cq.dequantize(c[r * h + j] as i32); }
        *yj = p.y_quant.quantize_i8(sigmoid(o[j]) * (qc / denom));
    }
}
