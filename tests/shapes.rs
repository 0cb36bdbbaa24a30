mod common;

use common::*;
use pretty_assertions::assert_eq;
use xlstm_kernels::cell::mlstm::{self, MlstmStates, MlstmWeights};
use xlstm_kernels::cell::slstm::{self, SlstmStates, SlstmWeights};
use xlstm_kernels::cell::mlstm_q8::MlstmQ8Weights;
use xlstm_kernels::cell::prepare::QuantizedMlstm;
use xlstm_kernels::cell::slstm_q8::{self, SlstmQ8Weights};
use xlstm_kernels::quant::MAX_DOT_LEN;
use xlstm_kernels::{CellKind, CellParams, Dims, QuantParam, QuantScratch, Scratch, SeqShape, XlstmError};

fn slstm_dims() -> Dims { Dims::new(2, 2).unwrap() }

#[test]
fn zero_sizes_are_rejected() {
    assert_eq!(Dims::new(0, 2), Err(XlstmError::ZeroDim { name: "input_size" }));
    assert_eq!(Dims::new(3, 0), Err(XlstmError::ZeroDim { name: "hidden_size" }));
}

#[test]
fn gate_row_counts() {
    let dims = Dims::new(5, 4).unwrap();
    assert_eq!(CellKind::Slstm.gate_rows(&dims), 16);
    assert_eq!(CellKind::Mlstm.gate_rows(&dims), 18);
    assert_eq!(CellKind::Mlstm.memory_len(4), 16);
    assert_eq!(CellKind::Mlstm.stabilizer_len(4), 1);
    assert_eq!(CellKind::Slstm.stabilizer_len(4), 4);
}

#[test]
fn weight_lengths_are_checked() {
    let err = SlstmWeights::new(slstm_dims(), &SLSTM_W[..15], &SLSTM_R, &SLSTM_B).unwrap_err();
    assert_eq!(err, XlstmError::Length { name: "W", expected: 16, actual: 15 });
    let err = MlstmWeights::new(Dims::new(3, 2).unwrap(), &MLSTM_W, &MLSTM_B[..8]).unwrap_err();
    assert_eq!(err, XlstmError::Length { name: "b", expected: 10, actual: 8 });
}

#[test]
fn small_scratch_is_an_error() {
    let weights = SlstmWeights::new(slstm_dims(), &SLSTM_W, &SLSTM_R, &SLSTM_B).unwrap();
    let mut states = SlstmStates::zeros(1, 2);
    let err = slstm::step_f32(&weights, &[1.0, 0.5], &mut states.view(), &mut Scratch::new(7), &CellParams::default()).unwrap_err();
    assert_eq!(err, XlstmError::Scratch { required: 8, actual: 7 });
}

#[test]
fn oversized_scratch_is_fine() {
    let weights = SlstmWeights::new(slstm_dims(), &SLSTM_W, &SLSTM_R, &SLSTM_B).unwrap();
    let mut states = SlstmStates::zeros(1, 2);
    slstm::step_f32(&weights, &[1.0, 0.5], &mut states.view(), &mut Scratch::new(64), &CellParams::default()).unwrap();
    assert_close(&states.y, &[0.01359604, -0.22511525], TOL, "y");
}

#[test]
fn io_and_state_lengths_are_checked() {
    let weights = SlstmWeights::new(slstm_dims(), &SLSTM_W, &SLSTM_R, &SLSTM_B).unwrap();
    let mut scratch = Scratch::for_slstm(&slstm_dims());
    let params = CellParams::default();

    let mut states = SlstmStates::zeros(1, 2);
    let mut out = vec![0.0; 5];
    let err = slstm::eval_f32(&weights, &SLSTM_SEQ, SeqShape::new(1, 3), &mut states.view(), &mut out, &mut scratch, &params).unwrap_err();
    assert_eq!(err, XlstmError::Length { name: "output", expected: 6, actual: 5 });

    // state sized for one sequence, call asks for two
    let mut out = vec![0.0; 12];
    let mut input = SLSTM_SEQ.to_vec();
    input.extend_from_slice(&SLSTM_SEQ);
    let err = slstm::eval_f32(&weights, &input, SeqShape::new(2, 3), &mut states.view(), &mut out, &mut scratch, &params).unwrap_err();
    assert_eq!(err, XlstmError::Length { name: "y", expected: 4, actual: 2 });

    let mdims = Dims::new(3, 2).unwrap();
    let mw = MlstmWeights::new(mdims, &MLSTM_W, &MLSTM_B).unwrap();
    let mut ms = MlstmStates::zeros(1, 2);
    ms.c.truncate(3);
    let err = mlstm::step_f32(&mw, &[1.0, 0.5, -0.3], &mut ms.view(), &mut Scratch::for_mlstm(&mdims), &params).unwrap_err();
    assert_eq!(err, XlstmError::Length { name: "C", expected: 4, actual: 3 });
}

#[test]
fn empty_sequences_leave_state_untouched() {
    let weights = SlstmWeights::new(slstm_dims(), &SLSTM_W, &SLSTM_R, &SLSTM_B).unwrap();
    let mut scratch = Scratch::for_slstm(&slstm_dims());
    let mut states = SlstmStates::zeros(1, 2);
    states.c.copy_from_slice(&[0.3, -0.4]);
    states.n.copy_from_slice(&[1.0, 1.0]);
    let before = states.clone();
    slstm::eval_f32(&weights, &[], SeqShape::new(1, 0), &mut states.view(), &mut [], &mut scratch, &CellParams::default()).unwrap();
    assert_eq!(states, before);

    let mut none = SlstmStates::zeros(0, 2);
    slstm::eval_f32(&weights, &[], SeqShape::new(0, 4), &mut none.view(), &mut [], &mut scratch, &CellParams::default()).unwrap();
    assert_eq!(none.batch_size(), 0);
}

#[test]
fn quantized_params_are_validated() {
    let input = [1.0f32, 0.5];
    let mut q = quantize_slstm(slstm_dims(), &SLSTM_W, &SLSTM_R, &SLSTM_B, &input, 0.01);
    let x = q.quantize_input(&input);
    let mut scratch = QuantScratch::for_slstm(&slstm_dims());

    q.params.y_quant = QuantParam::new(0.0, 0);
    let mut states = q.fresh_states(1);
    let err = slstm_q8::step_q8(&q.weights().unwrap(), &x, &mut states.view(), &mut scratch, &q.params).unwrap_err();
    assert_eq!(err, XlstmError::InvalidScale { name: "y", scale: 0.0 });

    q.params.y_quant = QuantParam::new(0.01, 300);
    let err = slstm_q8::step_q8(&q.weights().unwrap(), &x, &mut states.view(), &mut scratch, &q.params).unwrap_err();
    assert_eq!(err, XlstmError::ZeroPointRange { name: "y", zero_point: 300 });

    q.params.y_quant = QuantParam::new(0.01, 0);
    q.params.n_quant = QuantParam::new(0.01, -2);
    let err = slstm_q8::step_q8(&q.weights().unwrap(), &x, &mut states.view(), &mut scratch, &q.params).unwrap_err();
    assert_eq!(err, XlstmError::StateZeroPoint { name: "n", zero_point: -2 });
}

#[test]
fn errors_render_readable_messages() {
    let err = XlstmError::Length { name: "W", expected: 16, actual: 15 };
    assert_eq!(err.to_string(), "W has 15 elements, expected 16");
}

#[test]
fn weights_reject_dims_built_without_validation() {
    let dims = Dims { input_size: 0, hidden_size: 2 };
    let err = SlstmWeights::new(dims, &[], &SLSTM_R, &SLSTM_B).unwrap_err();
    assert_eq!(err, XlstmError::ZeroDim { name: "input_size" });

    let dims = Dims { input_size: 3, hidden_size: 0 };
    let err = MlstmWeights::new(dims, &[], &[0.0; 2]).unwrap_err();
    assert_eq!(err, XlstmError::ZeroDim { name: "hidden_size" });

    let dims = Dims { input_size: 0, hidden_size: 2 };
    let err = SlstmQ8Weights::new(dims, &[], &[0; 16], &[0; 8]).unwrap_err();
    assert_eq!(err, XlstmError::ZeroDim { name: "input_size" });
    let err = MlstmQ8Weights::new(dims, &[], &[0; 10]).unwrap_err();
    assert_eq!(err, XlstmError::ZeroDim { name: "input_size" });
}

#[test]
fn zero_dims_do_not_deserialize() {
    assert!(serde_json::from_str::<Dims>(r#"{"input_size":0,"hidden_size":2}"#).is_err());
    let dims: Dims = serde_json::from_str(r#"{"input_size":3,"hidden_size":2}"#).unwrap();
    assert_eq!(dims, Dims::new(3, 2).unwrap());

    let q = quantize_mlstm(Dims::new(3, 2).unwrap(), &MLSTM_W, &MLSTM_B, &MLSTM_SEQ, 0.01);
    let json = serde_json::to_string(&q).unwrap().replace(r#""input_size":3"#, r#""input_size":0"#);
    assert!(serde_json::from_str::<QuantizedMlstm>(&json).is_err());
}

#[test]
fn int8_rows_longer_than_an_exact_dot_are_rejected() {
    let len = MAX_DOT_LEN + 1;
    let dims = Dims::new(len, 1).unwrap();
    let err = SlstmQ8Weights::new(dims, &vec![0; 4 * len], &[0; 4], &[0; 4]).unwrap_err();
    assert_eq!(err, XlstmError::DotTooLong { name: "input_size", len, max: MAX_DOT_LEN });
    let err = MlstmQ8Weights::new(dims, &vec![0; 6 * len], &[0; 6]).unwrap_err();
    assert_eq!(err, XlstmError::DotTooLong { name: "input_size", len, max: MAX_DOT_LEN });
}
