use crate::cell::Dims;
use crate::error::{Result, XlstmError};

/// Pre-activation buffer for the float kernels.
///
/// Owned by the caller and lent to a kernel for one call; contents are
/// undefined between calls.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    pub buf: Vec<f32>,
}

impl Scratch {
    pub fn new(rows: usize) -> Self { Self { buf: vec![0.0; rows] } }
    pub fn for_slstm(dims: &Dims) -> Self { Self::new(dims.slstm_rows()) }
    pub fn for_mlstm(dims: &Dims) -> Self { Self::new(dims.mlstm_rows()) }

    pub(crate) fn rows(&mut self, required: usize) -> Result<&mut [f32]> {
        let actual = self.buf.len();
        self.buf.get_mut(..required).ok_or(XlstmError::Scratch { required, actual })
    }
}

/// Integer accumulators plus dequantized pre-activations for the INT8
/// kernels.
#[derive(Debug, Clone, Default)]
pub struct QuantScratch {
    /// Raw `W·(x - x_zp)` accumulator per gate row from the last step.
    pub acc: Vec<i32>,
    pub preact: Vec<f32>,
}

impl QuantScratch {
    pub fn new(rows: usize) -> Self { Self { acc: vec![0; rows], preact: vec![0.0; rows] } }
    pub fn for_slstm(dims: &Dims) -> Self { Self::new(dims.slstm_rows()) }
    pub fn for_mlstm(dims: &Dims) -> Self { Self::new(dims.mlstm_rows()) }

    pub(crate) fn rows(&mut self, required: usize) -> Result<(&mut [i32], &mut [f32])> {
        let actual = self.acc.len().min(self.preact.len());
        if actual < required {
            return Err(XlstmError::Scratch { required, actual });
        }
        Ok((&mut self.acc[..required], &mut self.preact[..required]))
    }
}
