// sLSTM / mLSTM recurrent cell kernels, f32 and INT8
pub mod math;
pub mod error;
pub mod quant;
pub mod cell;
pub mod parallel;

pub use cell::{CellKind, CellParams, Dims, SeqShape};
pub use cell::scratch::{QuantScratch, Scratch};
pub use error::{Result, XlstmError};
pub use quant::QuantParam;
