use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend as _;
use clap::{Parser, ValueEnum};
use diffreg_io::{NiftiPairDataset, ResultWriter};
use diffreg_registration::{
    ConsoleProgressCallback, InferenceOrchestrator, ProgressCallback, RunOutcome,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod progress;

use config::RunConfig;
use progress::ProgressBarCallback;

#[cfg(not(feature = "wgpu"))]
type Backend = burn_ndarray::NdArray<f32>;
#[cfg(feature = "wgpu")]
type Backend = burn::backend::Wgpu;

type Device = <Backend as burn::tensor::backend::Backend>::Device;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Phase {
    Train,
    Test,
}

#[derive(Parser, Debug)]
#[command(name = "diffreg")]
#[command(about = "Diffusion-model deformable registration of cardiac MRI")]
struct Cli {
    /// JSON run configuration
    #[arg(short, long, default_value = "config/diffreg_test.json")]
    config: PathBuf,

    /// Run phase; only `test` is supported
    #[arg(short, long, value_enum, default_value_t = Phase::Test)]
    phase: Phase,

    /// Comma-separated GPU indices; the first one is used
    #[arg(long)]
    gpu_ids: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if cli.phase == Phase::Train {
        bail!("Training is not supported by this binary, use --phase test");
    }

    let config = RunConfig::from_file(&cli.config)?;
    let device = select_device(cli.gpu_ids.as_deref())?;
    info!("Run {} on {:?}", config.name, device);

    let outcome = run(&config, &device)?;
    println!();
    print!("{}", outcome.summary());
    Ok(exit_code(&outcome))
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(config: &RunConfig, device: &Device) -> Result<RunOutcome> {
    Backend::seed(config.seed);

    let dataset = NiftiPairDataset::<Backend>::open(&config.dataset_root, device)?;
    let model = config
        .model
        .init::<Backend>(config.checkpoint_path(), device)?
        .with_seed(config.seed);
    let writer = ResultWriter::new(&config.results_dir)?;
    info!("Results go to {}", writer.dir().display());

    let bar = ProgressBarCallback::new()?;
    let progress: Arc<dyn ProgressCallback> = if bar.is_hidden() {
        Arc::new(ConsoleProgressCallback::default())
    } else {
        Arc::new(bar)
    };

    let mut orchestrator =
        InferenceOrchestrator::<Backend, _, _>::new(config.inference.clone(), model, writer)?
            .with_progress(progress);
    Ok(orchestrator.run(&dataset)?)
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Completed(_) => ExitCode::SUCCESS,
        RunOutcome::StopRequested { reason, .. } => {
            eprintln!("Stopped early: {reason}");
            ExitCode::from(2)
        }
        RunOutcome::Cancelled { .. } => {
            eprintln!("Cancelled");
            ExitCode::from(130)
        }
    }
}

/// Parse `--gpu-ids`, e.g. `0,1`.
fn parse_gpu_ids(ids: &str) -> Result<Vec<usize>> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<usize>()
                .with_context(|| format!("Invalid GPU id {id:?}"))
        })
        .collect()
}

#[cfg(not(feature = "wgpu"))]
fn select_device(gpu_ids: Option<&str>) -> Result<Device> {
    if let Some(ids) = gpu_ids {
        parse_gpu_ids(ids)?;
        warn!("Ignoring --gpu-ids {ids}: built without GPU support");
    }
    Ok(Device::default())
}

#[cfg(feature = "wgpu")]
fn select_device(gpu_ids: Option<&str>) -> Result<Device> {
    use burn::backend::wgpu::WgpuDevice;

    let ids = gpu_ids.map(parse_gpu_ids).transpose()?.unwrap_or_default();
    if ids.len() > 1 {
        warn!("Using GPU {} only, multi-device inference is not supported", ids[0]);
    }
    Ok(ids
        .first()
        .map(|&id| WgpuDevice::DiscreteGpu(id))
        .unwrap_or_default())
}
