//! sLSTM cell, f32.
//!
//! Scalar-gated cell with exponential input/forget gates, a per-unit
//! normalizer `n` and a per-unit log-space stabilizer `m`. Gate rows are
//! grouped [input, forget, candidate, output], H rows each.

use crate::cell::scratch::Scratch;
use crate::cell::{check_state, clip, project, CellParams, Dims, SeqShape};
use crate::error::{check_len, Result};
use crate::math::{sigmoid, stabilize_gates, NORMALIZER_FLOOR};

/// Borrowed, shape-checked sLSTM weights.
#[derive(Debug, Clone, Copy)]
pub struct SlstmWeights<'a> {
    dims: Dims,
    /// [4H, I]
    pub w: &'a [f32],
    /// [4H, H]
    pub r: &'a [f32],
    /// [4H]
    pub b: &'a [f32],
}

impl<'a> SlstmWeights<'a> {
    pub fn new(dims: Dims, w: &'a [f32], r: &'a [f32], b: &'a [f32]) -> Result<Self> {
        dims.validate()?;
        let rows = dims.slstm_rows();
        check_len("W", w.len(), rows * dims.input_size)?;
        check_len("R", r.len(), rows * dims.hidden_size)?;
        check_len("b", b.len(), rows)?;
        Ok(Self { dims, w, r, b })
    }

    pub fn dims(&self) -> Dims { self.dims }
}

/// Mutable state view: y, c, n, m each [batch, H].
#[derive(Debug)]
pub struct SlstmState<'s> {
    pub y: &'s mut [f32],
    pub c: &'s mut [f32],
    pub n: &'s mut [f32],
    pub m: &'s mut [f32],
}

impl<'s> SlstmState<'s> {
    pub fn new(y: &'s mut [f32], c: &'s mut [f32], n: &'s mut [f32], m: &'s mut [f32]) -> Self {
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

/// Zero-initialized owned state for `batch` sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct SlstmStates {
    pub hidden_size: usize,
    pub y: Vec<f32>,
    pub c: Vec<f32>,
    pub n: Vec<f32>,
    pub m: Vec<f32>,
}

impl SlstmStates {
    pub fn zeros(batch: usize, hidden_size: usize) -> Self {
        let len = batch * hidden_size;
        Self { hidden_size, y: vec![0.0; len], c: vec![0.0; len], n: vec![0.0; len], m: vec![0.0; len] }
    }

    pub fn batch_size(&self) -> usize { self.y.len() / self.hidden_size.max(1) }

    pub fn view(&mut self) -> SlstmState<'_> {
        SlstmState::new(&mut self.y, &mut self.c, &mut self.n, &mut self.m)
    }

    /// Start fresh sequences; the next step re-seeds the stabilizer.
    pub fn reset(&mut self) {
        for v in [&mut self.y, &mut self.c, &mut self.n, &mut self.m] { v.fill(0.0); }
    }
}

/// One timestep for a single sequence. `state` slices must be [H].
pub fn step_f32(
    weights: &SlstmWeights<'_>,
    x: &[f32],
    state: &mut SlstmState<'_>,
    scratch: &mut Scratch,
    params: &CellParams,
) -> Result<()> {
    let dims = weights.dims;
    check_len("x", x.len(), dims.input_size)?;
    state.check(1, dims.hidden_size)?;
    let pre = scratch.rows(dims.slstm_rows())?;
    step_element(weights, x, state.y, state.c, state.n, state.m, pre, params.cell_clip);
    Ok(())
}

/// Runs `input` [batch, time, I] through the cell, writing `output`
/// [batch, time, H]. Batch elements are processed one after another and never
/// interact; one scratch serves every step.
pub fn eval_f32(
    weights: &SlstmWeights<'_>,
    input: &[f32],
    seq: SeqShape,
    state: &mut SlstmState<'_>,
    output: &mut [f32],
    scratch: &mut Scratch,
    params: &CellParams,
) -> Result<()> {
    let dims = weights.dims;
    seq.check_io(&dims, input.len(), output.len())?;
    state.check(seq.batch, dims.hidden_size)?;
    let pre = scratch.rows(dims.slstm_rows())?;
    if seq.is_empty() { return Ok(()); }

    let (i, h) = (dims.input_size, dims.hidden_size);
    let elems = input
        .chunks_exact(seq.time * i)
        .zip(output.chunks_exact_mut(seq.time * h))
        .zip(state.y.chunks_exact_mut(h).zip(state.c.chunks_exact_mut(h)))
        .zip(state.n.chunks_exact_mut(h).zip(state.m.chunks_exact_mut(h)));
    for (((x_seq, out_seq), (y, c)), (n, m)) in elems {
        run_element(weights, x_seq, out_seq, y, c, n, m, pre, params.cell_clip);
    }
    Ok(())
}

/// Time loop for one batch element; shapes already validated.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_element(
    weights: &SlstmWeights<'_>,
    x_seq: &[f32],
    out_seq: &mut [f32],
    y: &mut [f32],
    c: &mut [f32],
    n: &mut [f32],
    m: &mut [f32],
    pre: &mut [f32],
    cell_clip: f32,
) {
    let (i, h) = (weights.dims.input_size, weights.dims.hidden_size);
    for (x_t, out_t) in x_seq.chunks_exact(i).zip(out_seq.chunks_exact_mut(h)) {
        step_element(weights, x_t, y, c, n, m, pre, cell_clip);
        out_t.copy_from_slice(y);
    }
}

#[allow(clippy::too_many_arguments)]
fn step_element(
    weights: &SlstmWeights<'_>,
    x: &[f32],
    y: &mut [f32],
    c: &mut [f32],
    n: &mut [f32],
    m: &mut [f32],
    pre: &mut [f32],
    cell_clip: f32,
) {
    let h = weights.dims.hidden_size;

    project(pre, weights.w, weights.b, x);
    for (row, p) in pre.iter_mut().enumerate() {
        for (rv, yv) in weights.r[row * h..(row + 1) * h].iter().zip(y.iter()) { *p += rv * yv; }
    }

    let (i_raw, rest) = pre.split_at(h);
    let (f_raw, rest) = rest.split_at(h);
    let (z_raw, o_raw) = rest.split_at(h);
    for u in 0..h {
        // a zero normalizer marks a sequence that has not stepped yet
        let g = stabilize_gates(i_raw[u], f_raw[u], m[u], n[u] == 0.0);
        let o_gate = sigmoid(o_raw[u]);
        let c_input = z_raw[u].tanh();

        let c_new = clip(cell_clip, g.f_gate * c[u] + g.i_gate * c_input);
        let n_new = g.f_gate * n[u] + g.i_gate;

        c[u] = c_new;
        n[u] = n_new;
        m[u] = g.m;
        y[u] = o_gate * (c_new / n_new.max(NORMALIZER_FLOOR));
    }
}
