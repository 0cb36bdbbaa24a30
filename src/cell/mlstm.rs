//! mLSTM cell, f32.
//!
//! Matrix-memory cell: an H×H memory `C` is updated by a gated key/value outer
//! product and read out with the query, normalized by the key-sum `n`. Gates
//! and the stabilizer `m` are scalars per sequence. There is no recurrent
//! weight; y does not feed the next pre-activation.
//!
//! Gate rows: q[H], k[H], v[H], i (1), f (1), o[H].

use crate::cell::scratch::Scratch;
use crate::cell::{check_state, clip, project, CellParams, Dims, SeqShape};
use crate::error::{check_len, Result};
use crate::math::{sigmoid, stabilize_gates, StabilizedGates, DENOM_EPS};

/// Borrowed, shape-checked mLSTM weights.
#[derive(Debug, Clone, Copy)]
pub struct MlstmWeights<'a> {
    dims: Dims,
    /// [4H+2, I]
    pub w: &'a [f32],
    /// [4H+2]
    pub b: &'a [f32],
}

impl<'a> MlstmWeights<'a> {
    pub fn new(dims: Dims, w: &'a [f32], b: &'a [f32]) -> Result<Self> {
        dims.validate()?;
        let rows = dims.mlstm_rows();
        check_len("W", w.len(), rows * dims.input_size)?;
        check_len("b", b.len(), rows)?;
        Ok(Self { dims, w, b })
    }

    pub fn dims(&self) -> Dims { self.dims }
}

/// Mutable state view: y [batch, H], C [batch, H*H], n [batch, H], m [batch].
#[derive(Debug)]
pub struct MlstmState<'s> {
    pub y: &'s mut [f32],
    pub c: &'s mut [f32],
    pub n: &'s mut [f32],
    pub m: &'s mut [f32],
}

impl<'s> MlstmState<'s> {
    pub fn new(y: &'s mut [f32], c: &'s mut [f32], n: &'s mut [f32], m: &'s mut [f32]) -> Self {
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

/// Zero-initialized owned state for `batch` sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct MlstmStates {
    pub hidden_size: usize,
    pub y: Vec<f32>,
    pub c: Vec<f32>,
    pub n: Vec<f32>,
    pub m: Vec<f32>,
}

impl MlstmStates {
    pub fn zeros(batch: usize, hidden_size: usize) -> Self {
        let h = hidden_size;
        Self { hidden_size, y: vec![0.0; batch * h], c: vec![0.0; batch * h * h], n: vec![0.0; batch * h], m: vec![0.0; batch] }
    }

    pub fn batch_size(&self) -> usize { self.m.len() }

    pub fn view(&mut self) -> MlstmState<'_> {
        MlstmState::new(&mut self.y, &mut self.c, &mut self.n, &mut self.m)
    }

    pub fn reset(&mut self) {
        for v in [&mut self.y, &mut self.c, &mut self.n, &mut self.m] { v.fill(0.0); }
    }
}

pub fn step_f32(
    weights: &MlstmWeights<'_>,
    x: &[f32],
    state: &mut MlstmState<'_>,
    scratch: &mut Scratch,
    params: &CellParams,
) -> Result<()> {
    let dims = weights.dims;
    check_len("x", x.len(), dims.input_size)?;
    state.check(1, dims.hidden_size)?;
    let pre = scratch.rows(dims.mlstm_rows())?;
    step_element(weights, x, state.y, state.c, state.n, &mut state.m[0], pre, params.cell_clip);
    Ok(())
}

/// Runs `input` [batch, time, I] through the cell, writing `output`
/// [batch, time, H].
pub fn eval_f32(
    weights: &MlstmWeights<'_>,
    input: &[f32],
    seq: SeqShape,
    state: &mut MlstmState<'_>,
    output: &mut [f32],
    scratch: &mut Scratch,
    params: &CellParams,
) -> Result<()> {
    let dims = weights.dims;
    seq.check_io(&dims, input.len(), output.len())?;
    state.check(seq.batch, dims.hidden_size)?;
    let pre = scratch.rows(dims.mlstm_rows())?;
    if seq.is_empty() { return Ok(()); }

    let (i, h) = (dims.input_size, dims.hidden_size);
    let elems = input
        .chunks_exact(seq.time * i)
        .zip(output.chunks_exact_mut(seq.time * h))
        .zip(state.y.chunks_exact_mut(h).zip(state.c.chunks_exact_mut(h * h)))
        .zip(state.n.chunks_exact_mut(h).zip(state.m.iter_mut()));
    for (((x_seq, out_seq), (y, c)), (n, m)) in elems {
        run_element(weights, x_seq, out_seq, y, c, n, m, pre, params.cell_clip);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn run_element(
    weights: &MlstmWeights<'_>,
    x_seq: &[f32],
    out_seq: &mut [f32],
    y: &mut [f32],
    c: &mut [f32],
    n: &mut [f32],
    m: &mut f32,
    pre: &mut [f32],
    cell_clip: f32,
) {
    let (i, h) = (weights.dims.input_size, weights.dims.hidden_size);
    for (x_t, out_t) in x_seq.chunks_exact(i).zip(out_seq.chunks_exact_mut(h)) {
        step_element(weights, x_t, y, c, n, m, pre, cell_clip);
        out_t.copy_from_slice(y);
    }
}

/// Projections of one mLSTM step after key scaling and gate stabilization.
pub(crate) struct Projections<'p> {
    pub q: &'p [f32],
    pub k: &'p [f32],
    pub v: &'p [f32],
    pub o: &'p [f32],
    pub gates: StabilizedGates,
}

/// Splits the pre-activation row into projections, scales the key by
/// `1/sqrt(H)` and stabilizes the scalar gates against `m_prev`.
pub(crate) fn split_projections(pre: &mut [f32], h: usize, m_prev: f32) -> Projections<'_> {
    let (q, rest) = pre.split_at_mut(h);
    let (k, rest) = rest.split_at_mut(h);
    let (v, rest) = rest.split_at_mut(h);
    let (if_raw, o) = rest.split_at_mut(2);

    let k_scale = 1.0 / (h as f32).sqrt();
    for kv in k.iter_mut() { *kv *= k_scale; }

    let gates = stabilize_gates(if_raw[0], if_raw[1], m_prev, false);
    Projections { q, k, v, o, gates }
}

/// `max(|q·n|, exp(-m)) + eps`
#[inline]
pub(crate) fn output_denominator(qn: f32, m: f32) -> f32 {
    qn.abs().max((-m).exp()) + DENOM_EPS
}

#[allow(clippy::too_many_arguments)]
fn step_element(
    weights: &MlstmWeights<'_>,
    x: &[f32],
    y: &mut [f32],
    c: &mut [f32],
    n: &mut [f32],
    m: &mut f32,
    pre: &mut [f32],
    cell_clip: f32,
) {
    let h = weights.dims.hidden_size;
    project(pre, weights.w, weights.b, x);
    let Projections { q, k, v, o, gates: g } = split_projections(pre, h, *m);

    for (row, &kr) in c.chunks_exact_mut(h).zip(k) {
        for (cell, &vc) in row.iter_mut().zip(v) {
            *cell = clip(cell_clip, g.f_gate * *cell + g.i_gate * kr * vc);
        }
    }
    for (nv, &kv) in n.iter_mut().zip(k) {
        *nv = g.f_gate * *nv + g.i_gate * kv;
    }
    *m = g.m;

    let qn: f32 = q.iter().zip(n.iter()).map(|(a, b)| a * b).sum();
    let denom = output_denominator(qn, g.m);
    for (j, yj) in y.iter_mut().enumerate() {
        let mut qc = 0.0f32;
        for (r, &qr) in q.iter().enumerate() { qc += qr * c[r * h + j]; }
        *yj = sigmoid(o[j]) * (qc / denom);
    }
}
