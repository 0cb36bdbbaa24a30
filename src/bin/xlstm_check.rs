use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::path::PathBuf;
use xlstm_kernels::cell::mlstm::{MlstmStates, MlstmWeights};
use xlstm_kernels::cell::prepare::{calibrate_mlstm, calibrate_slstm, QuantizedMlstm, QuantizedSlstm};
use xlstm_kernels::cell::slstm::{SlstmStates, SlstmWeights};
use xlstm_kernels::parallel::{mlstm_eval_f32_par, mlstm_eval_q8_par, slstm_eval_f32_par, slstm_eval_q8_par};
use xlstm_kernels::{CellKind, CellParams, Dims, QuantParam, SeqShape};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CellArg {
    Slstm,
    Mlstm,
}

impl From<CellArg> for CellKind {
    fn from(c: CellArg) -> Self {
        match c {
            CellArg::Slstm => CellKind::Slstm,
            CellArg::Mlstm => CellKind::Mlstm,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "xlstm-check", version, about = "Compare INT8 sLSTM/mLSTM kernels against f32 on random cells")]
struct Args {
    /// Cell variant
    #[arg(long, value_enum, default_value = "slstm")]
    cell: CellArg,

    #[arg(long, default_value_t = 8)]
    input_size: usize,

    #[arg(long, default_value_t = 16)]
    hidden: usize,

    #[arg(long, default_value_t = 4)]
    batch: usize,

    #[arg(long, default_value_t = 32)]
    time: usize,

    /// Independent random cells to check
    #[arg(long, default_value_t = 10)]
    trials: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Standard deviation of the random weights
    #[arg(long, default_value_t = 0.5)]
    weight_std: f32,

    /// Cell clip (0 disables)
    #[arg(long, default_value_t = 0.0)]
    cell_clip: f32,

    /// Fail when any trial's max absolute error exceeds this
    #[arg(long, default_value_t = 0.15)]
    tolerance: f32,

    /// Rayon threads (0 = rayon default)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Write a JSON report here
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TrialReport {
    trial: usize,
    max_abs_err: f32,
    mean_abs_err: f32,
    w_scale: f32,
    y_quant: QuantParam,
}

#[derive(Debug, Serialize)]
struct RunReport {
    cell: CellKind,
    dims: Dims,
    seq: SeqShape,
    cell_clip: f32,
    worst: f32,
    trials: Vec<TrialReport>,
}

struct RandomCell {
    w: Vec<f32>,
    r: Vec<f32>,
    b: Vec<f32>,
    input: Vec<f32>,
}

fn random_cell(kind: CellKind, dims: &Dims, seq: SeqShape, std: f32, rng: &mut SmallRng) -> Result<RandomCell> {
    let normal = Normal::new(0.0f32, std).context("weight distribution")?;
    let rows = kind.gate_rows(dims);
    let mut sample = |n: usize| -> Vec<f32> { (0..n).map(|_| normal.sample(rng)).collect() };
    let w = sample(rows * dims.input_size);
    let r = match kind {
        CellKind::Slstm => sample(rows * dims.hidden_size),
        CellKind::Mlstm => Vec::new(),
    };
    let b = sample(rows);
    let input = (0..seq.batch * seq.time * dims.input_size).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    Ok(RandomCell { w, r, b, input })
}

fn error_stats(reference: &[f32], approx: &[f32]) -> (f32, f32) {
    let mut max = 0.0f32;
    let mut sum = 0.0f64;
    for (a, b) in reference.iter().zip(approx) {
        let d = (a - b).abs();
        max = max.max(d);
        sum += d as f64;
    }
    (max, (sum / reference.len().max(1) as f64) as f32)
}

fn run_trial(kind: CellKind, dims: Dims, seq: SeqShape, args: &Args, trial: usize) -> Result<TrialReport> {
    let mut rng = SmallRng::seed_from_u64(args.seed.wrapping_add(trial as u64));
    let cell = random_cell(kind, &dims, seq, args.weight_std, &mut rng)?;
    let params = CellParams::with_clip(args.cell_clip);
    let out_len = seq.batch * seq.time * dims.hidden_size;
    let mut reference = vec![0f32; out_len];
    let mut q_out = vec![0i8; out_len];

    let (approx, w_scale, y_quant) = match kind {
        CellKind::Slstm => {
            let weights = SlstmWeights::new(dims, &cell.w, &cell.r, &cell.b)?;
            let mut states = SlstmStates::zeros(seq.batch, dims.hidden_size);
            slstm_eval_f32_par(&weights, &cell.input, seq, &mut states.view(), &mut reference, &params)?;

            let cal = calibrate_slstm(&weights, &cell.input, seq, &params)?;
            let q = QuantizedSlstm::from_f32(&weights, &cal, args.cell_clip)?;
            let x_q = q.quantize_input(&cell.input);
            let mut q_states = q.fresh_states(seq.batch);
            slstm_eval_q8_par(&q.weights()?, &x_q, seq, &mut q_states.view(), &mut q_out, &q.params)?;
            (q.dequantize_output(&q_out), q.params.w_scale, q.params.y_quant)
        }
        CellKind::Mlstm => {
            let weights = MlstmWeights::new(dims, &cell.w, &cell.b)?;
            let mut states = MlstmStates::zeros(seq.batch, dims.hidden_size);
            mlstm_eval_f32_par(&weights, &cell.input, seq, &mut states.view(), &mut reference, &params)?;

            let cal = calibrate_mlstm(&weights, &cell.input, seq, &params)?;
            let q = QuantizedMlstm::from_f32(&weights, &cal, args.cell_clip)?;
            let x_q = q.quantize_input(&cell.input);
            let mut q_states = q.fresh_states(seq.batch);
            mlstm_eval_q8_par(&q.weights()?, &x_q, seq, &mut q_states.view(), &mut q_out, &q.params)?;
            (q.dequantize_output(&q_out), q.params.w_scale, q.params.y_quant)
        }
    };

    let (max_abs_err, mean_abs_err) = error_stats(&reference, &approx);
    Ok(TrialReport { trial, max_abs_err, mean_abs_err, w_scale, y_quant })
}

fn run(args: &Args) -> Result<RunReport> {
    let kind = CellKind::from(args.cell);
    let dims = Dims::new(args.input_size, args.hidden)?;
    let seq = SeqShape::new(args.batch, args.time);
    info!("checking {:?} dims={:?} batch={} time={} trials={}", kind, dims, seq.batch, seq.time, args.trials);

    let pb = ProgressBar::new(args.trials as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .context("progress template")?,
    );
    let mut trials = Vec::with_capacity(args.trials);
    let mut worst = 0.0f32;
    for t in 0..args.trials {
        let r = run_trial(kind, dims, seq, args, t).with_context(|| format!("trial {}", t))?;
        worst = worst.max(r.max_abs_err);
        pb.set_message(format!("worst={:.4}", worst));
        pb.inc(1);
        trials.push(r);
    }
    pb.finish_and_clear();
    Ok(RunReport { cell: kind, dims, seq, cell_clip: args.cell_clip, worst, trials })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let report = if args.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(args.threads).build().context("thread pool")?;
        pool.install(|| run(&args))?
    } else {
        run(&args)?
    };

    for t in &report.trials {
        info!("trial {}: max={:.5} mean={:.5} w_scale={:e}", t.trial, t.max_abs_err, t.mean_abs_err, t.w_scale);
    }
    println!(
        "cell={:?} hidden={} input={} batch={} time={} trials={} worst_abs_err={:.5}",
        report.cell, report.dims.hidden_size, report.dims.input_size, report.seq.batch, report.seq.time, report.trials.len(), report.worst
    );

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("write report: {}", path.display()))?;
        info!("wrote report to {}", path.display());
    }

    if report.worst > args.tolerance {
        bail!("worst error {:.5} exceeds tolerance {:.5}", report.worst, args.tolerance);
    }
    Ok(())
}
