use thiserror::Error;

/// Caller-contract violations caught before a kernel touches any state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum XlstmError {
    #[error("{name} must be non-zero")]
    ZeroDim { name: &'static str },

    #[error("{name} has {actual} elements, expected {expected}")]
    Length { name: &'static str, expected: usize, actual: usize },

    #[error("scratch buffer holds {actual} rows, kernel needs {required}")]
    Scratch { required: usize, actual: usize },

    #[error("{name} scale must be finite and positive, got {scale}")]
    InvalidScale { name: &'static str, scale: f32 },

    #[error("{name} is stored as 16-bit symmetric and needs zero point 0, got {zero_point}")]
    StateZeroPoint { name: &'static str, zero_point: i32 },

    #[error("{name} zero point {zero_point} is outside the signed 8-bit range")]
    ZeroPointRange { name: &'static str, zero_point: i32 },

    #[error("{name} = {len} exceeds the longest exact INT8 dot product ({max})")]
    DotTooLong { name: &'static str, len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, XlstmError>;

pub(crate) fn check_len(name: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(XlstmError::Length { name, expected, actual })
    }
}
