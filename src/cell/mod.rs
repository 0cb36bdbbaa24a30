pub mod scratch;
pub mod slstm;
pub mod mlstm;
pub mod slstm_q8;
pub mod mlstm_q8;
pub mod prepare;

use crate::error::{check_len, Result, XlstmError};
use crate::quant::MAX_DOT_LEN;
use serde::{Deserialize, Serialize};

/// Input and hidden sizes; fixed for the lifetime of a set of weights.
///
/// Deserialization goes through [`Dims::new`]. A struct literal can still
/// hold a zero size, so every weights constructor re-validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDims")]
pub struct Dims {
    pub input_size: usize,
    pub hidden_size: usize,
}

#[derive(Deserialize)]
struct RawDims {
    input_size: usize,
    hidden_size: usize,
}

impl TryFrom<RawDims> for Dims {
    type Error = XlstmError;

    fn try_from(raw: RawDims) -> Result<Self> { Dims::new(raw.input_size, raw.hidden_size) }
}

impl Dims {
    pub fn new(input_size: usize, hidden_size: usize) -> Result<Self> {
        let dims = Self { input_size, hidden_size };
        dims.validate()?;
        Ok(dims)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 { return Err(XlstmError::ZeroDim { name: "input_size" }); }
        if self.hidden_size == 0 { return Err(XlstmError::ZeroDim { name: "hidden_size" }); }
        Ok(())
    }

    /// INT8 kernels accumulate dot products of length I (and H for the sLSTM
    /// recurrence) in i32; longer rows could overflow.
    pub(crate) fn validate_q8(&self, recurrent: bool) -> Result<()> {
        self.validate()?;
        if self.input_size > MAX_DOT_LEN {
            return Err(XlstmError::DotTooLong { name: "input_size", len: self.input_size, max: MAX_DOT_LEN });
        }
        if recurrent && self.hidden_size > MAX_DOT_LEN {
            return Err(XlstmError::DotTooLong { name: "hidden_size", len: self.hidden_size, max: MAX_DOT_LEN });
        }
        Ok(())
    }

    /// Gate rows of the sLSTM projection: [input, forget, candidate, output].
    pub fn slstm_rows(&self) -> usize { 4 * self.hidden_size }

    /// Gate rows of the mLSTM projection: [q, k, v, i, f, o].
    pub fn mlstm_rows(&self) -> usize { 4 * self.hidden_size + 2 }
}

/// Batch and time extents of a sequence call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqShape {
    pub batch: usize,
    pub time: usize,
}

impl SeqShape {
    pub fn new(batch: usize, time: usize) -> Self { Self { batch, time } }

    pub(crate) fn is_empty(&self) -> bool { self.batch == 0 || self.time == 0 }

    /// Checks `input` is [batch, time, I] and `output` is [batch, time, H].
    pub(crate) fn check_io(&self, dims: &Dims, input: usize, output: usize) -> Result<()> {
        check_len("input", input, self.batch * self.time * dims.input_size)?;
        check_len("output", output, self.batch * self.time * dims.hidden_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Slstm,
    Mlstm,
}

impl CellKind {
    pub fn gate_rows(self, dims: &Dims) -> usize {
        match self {
            CellKind::Slstm => dims.slstm_rows(),
            CellKind::Mlstm => dims.mlstm_rows(),
        }
    }

    /// Elements of the memory state per batch element (c or C).
    pub fn memory_len(self, hidden_size: usize) -> usize {
        match self {
            CellKind::Slstm => hidden_size,
            CellKind::Mlstm => hidden_size * hidden_size,
        }
    }

    /// Elements of the stabilizer state per batch element.
    pub fn stabilizer_len(self, hidden_size: usize) -> usize {
        match self {
            CellKind::Slstm => hidden_size,
            CellKind::Mlstm => 1,
        }
    }
}

/// Float kernel configuration. `cell_clip == 0` disables clipping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CellParams {
    #[serde(default)]
    pub cell_clip: f32,
}

impl CellParams {
    pub fn with_clip(cell_clip: f32) -> Self { Self { cell_clip } }

    #[inline]
    pub fn clip(&self, v: f32) -> f32 { clip(self.cell_clip, v) }
}

#[inline]
pub(crate) fn clip(cell_clip: f32, v: f32) -> f32 {
    if cell_clip > 0.0 { v.clamp(-cell_clip, cell_clip) } else { v }
}

/// `b + W·x` for every gate row, accumulated bias first then column order.
#[inline]
pub(crate) fn project(pre: &mut [f32], w: &[f32], b: &[f32], x: &[f32]) {
    let n = x.len();
    for (row, p) in pre.iter_mut().enumerate() {
        let mut acc = b[row];
        for (wv, xv) in w[row * n..(row + 1) * n].iter().zip(x) { acc += wv * xv; }
        *p = acc;
    }
}

/// Checks that every per-element state slice holds `batch` elements of the
/// stated width.
pub(crate) fn check_state(batch: usize, parts: &[(&'static str, usize, usize)]) -> Result<()> {
    for &(name, len, width) in parts {
        check_len(name, len, batch * width)?;
    }
    Ok(())
}
