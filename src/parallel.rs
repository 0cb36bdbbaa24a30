//! Batch-parallel sequence evaluators.
//!
//! Batch elements own disjoint state, so each one can run on its own rayon
//! worker; timesteps within an element stay sequential. `for_each_init`
//! allocates a scratch for each rayon job, so a worker that runs several
//! split jobs allocates several. Results are bit-identical to the sequential
//! evaluators.

use crate::cell::mlstm::{self, MlstmState, MlstmWeights};
use crate::cell::mlstm_q8::{self, MlstmQ8Params, MlstmQ8State, MlstmQ8Weights};
use crate::cell::scratch::{QuantScratch, Scratch};
use crate::cell::slstm::{self, SlstmState, SlstmWeights};
use crate::cell::slstm_q8::{self, SlstmQ8Params, SlstmQ8State, SlstmQ8Weights};
use crate::cell::{check_state, CellParams, SeqShape};
use crate::error::Result;
use log::debug;
use rayon::prelude::*;

pub fn slstm_eval_f32_par(
    weights: &SlstmWeights<'_>,
    input: &[f32],
    seq: SeqShape,
    state: &mut SlstmState<'_>,
    output: &mut [f32],
    params: &CellParams,
) -> Result<()> {
    let dims = weights.dims();
    let h = dims.hidden_size;
    seq.check_io(&dims, input.len(), output.len())?;
    check_state(seq.batch, &[("y", state.y.len(), h), ("c", state.c.len(), h), ("n", state.n.len(), h), ("m", state.m.len(), h)])?;
    if seq.is_empty() { return Ok(()); }
    debug!("sLSTM f32 eval: batch={} time={} threads={}", seq.batch, seq.time, rayon::current_num_threads());

    let rows = dims.slstm_rows();
    input
        .par_chunks_exact(seq.time * dims.input_size)
        .zip(output.par_chunks_exact_mut(seq.time * h))
        .zip(state.y.par_chunks_exact_mut(h).zip(state.c.par_chunks_exact_mut(h)))
        .zip(state.n.par_chunks_exact_mut(h).zip(state.m.par_chunks_exact_mut(h)))
        .for_each_init(
            || Scratch::new(rows),
            |scratch, (((x_seq, out_seq), (y, c)), (n, m))| {
                slstm::run_element(weights, x_seq, out_seq, y, c, n, m, &mut scratch.buf, params.cell_clip);
            },
        );
    Ok(())
}

pub fn mlstm_eval_f32_par(
    weights: &MlstmWeights<'_>,
    input: &[f32],
    seq: SeqShape,
    state: &mut MlstmState<'_>,
    output: &mut [f32],
    params: &CellParams,
) -> Result<()> {
    let dims = weights.dims();
    let h = dims.hidden_size;
    seq.check_io(&dims, input.len(), output.len())?;
    check_state(seq.batch, &[("y", state.y.len(), h), ("C", state.c.len(), h * h), ("n", state.n.len(), h), ("m", state.m.len(), 1)])?;
    if seq.is_empty() { return Ok(()); }
    debug!("mLSTM f32 eval: batch={} time={} threads={}", seq.batch, seq.time, rayon::current_num_threads());

    let rows = dims.mlstm_rows();
    input
        .par_chunks_exact(seq.time * dims.input_size)
        .zip(output.par_chunks_exact_mut(seq.time * h))
        .zip(state.y.par_chunks_exact_mut(h).zip(state.c.par_chunks_exact_mut(h * h)))
        .zip(state.n.par_chunks_exact_mut(h).zip(state.m.par_iter_mut()))
        .for_each_init(
            || Scratch::new(rows),
            |scratch, (((x_seq, out_seq), (y, c)), (n, m))| {
                mlstm::run_element(weights, x_seq, out_seq, y, c, n, m, &mut scratch.buf, params.cell_clip);
            },
        );
    Ok(())
}

pub fn slstm_eval_q8_par(
    weights: &SlstmQ8Weights<'_>,
    input: &[i8],
    seq: SeqShape,
    state: &mut SlstmQ8State<'_>,
    output: &mut [i8],
    params: &SlstmQ8Params,
) -> Result<()> {
    let dims = weights.dims();
    let h = dims.hidden_size;
    params.validate()?;
    seq.check_io(&dims, input.len(), output.len())?;
    check_state(seq.batch, &[("y", state.y.len(), h), ("c", state.c.len(), h), ("n", state.n.len(), h), ("m", state.m.len(), h)])?;
    if seq.is_empty() { return Ok(()); }
    debug!("sLSTM q8 eval: batch={} time={} threads={}", seq.batch, seq.time, rayon::current_num_threads());

    let rows = dims.slstm_rows();
    input
        .par_chunks_exact(seq.time * dims.input_size)
        .zip(output.par_chunks_exact_mut(seq.time * h))
        .zip(state.y.par_chunks_exact_mut(h).zip(state.c.par_chunks_exact_mut(h)))
        .zip(state.n.par_chunks_exact_mut(h).zip(state.m.par_chunks_exact_mut(h)))
        .for_each_init(
            || QuantScratch::new(rows),
            |scratch, (((x_seq, out_seq), (y, c)), (n, m))| {
                let QuantScratch { acc, preact } = scratch;
                slstm_q8::run_element(weights, x_seq, out_seq, y, c, n, m, acc, preact, params);
            },
        );
    Ok(())
}

pub fn mlstm_eval_q8_par(
    weights: &MlstmQ8Weights<'_>,
    input: &[i8],
    seq: SeqShape,
    state: &mut MlstmQ8State<'_>,
    output: &mut [i8],
    params: &MlstmQ8Params,
) -> Result<()> {
    let dims = weights.dims();
    let h = dims.hidden_size;
    params.validate()?;
    seq.check_io(&dims, input.len(), output.len())?;
    check_state(seq.batch, &[("y", state.y.len(), h), ("C", state.c.len(), h * h), ("n", state.n.len(), h), ("m", state.m.len(), 1)])?;
    if seq.is_empty() { return Ok(()); }
    debug!("mLSTM q8 eval: batch={} time={} threads={}", seq.batch, seq.time, rayon::current_num_threads());

    let rows = dims.mlstm_rows();
    input
        .par_chunks_exact(seq.time * dims.input_size)
        .zip(output.par_chunks_exact_mut(seq.time * h))
        .zip(state.y.par_chunks_exact_mut(h).zip(state.c.par_chunks_exact_mut(h * h)))
        .zip(state.n.par_chunks_exact_mut(h).zip(state.m.par_iter_mut()))
        .for_each_init(
            || QuantScratch::new(rows),
            |scratch, (((x_seq, out_seq), (y, c)), (n, m))| {
                let QuantScratch { acc, preact } = scratch;
                mlstm_q8::run_element(weights, x_seq, out_seq, y, c, n, m, acc, preact, params);
            },
        );
    Ok(())
}
