mod config;
mod doctor;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use pisnap_camera::{backend, resolve_output, BackendKind, CaptureError, CaptureOutcome, CaptureRequest, CaptureRunner};

use config::{load_config, CameraCfg, Overrides, Resolved};

#[derive(Debug, Parser)]
#[command(
    name = "pisnap",
    version,
    about = "Capture a still image from the Raspberry Pi camera",
    subcommand_negates_reqs = true
)]
struct Cli {
    /// Output file path for the captured image (a directory gets a timestamped name).
    /// `test` and `doctor` are subcommands; write `./test` for a file of that name.
    #[arg(required = true)]
    output: Option<PathBuf>,

    /// Image width in pixels (default: 1920)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    width: Option<u32>,

    /// Image height in pixels (default: 1080)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    height: Option<u32>,

    #[command(flatten)]
    camera: CameraArgs,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, clap::Args)]
struct CameraArgs {
    /// Optional TOML file with a [camera] table
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Camera stack: rpicam | v4l2 | test-pattern
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// libcamera camera index (rpicam)
    #[arg(long, global = true)]
    camera: Option<u32>,

    /// Video node (v4l2), e.g. /dev/video0
    #[arg(long, global = true)]
    device: Option<PathBuf>,

    /// Sensor warm-up before the frame is read (default: 2000)
    #[arg(long, global = true)]
    warmup_ms: Option<u64>,

    /// Bound on each camera call in seconds, 0 for none (default: 30)
    #[arg(long, global = true)]
    step_timeout_s: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture a 640x480 frame, check it, and delete it.
    Test {
        /// Where to put the scratch image (default: a temporary directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Check configuration, camera tooling and device access.
    Doctor,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            backend: self.camera.backend,
            camera: self.camera.camera,
            device: self.camera.device.clone(),
            width: self.width,
            height: self.height,
            warmup_ms: self.camera.warmup_ms,
            step_timeout_s: self.camera.step_timeout_s,
        }
    }

    fn resolve(&self) -> Result<Resolved> {
        let file = match &self.camera.config {
            Some(path) => load_config(path)?.camera,
            None => CameraCfg::default(),
        };
        Resolved::new(&self.overrides(), &file)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help / --version land here too
            return ExitCode::from(if e.use_stderr() { 1 } else { 0 });
        }
    };

    let (mut out, mut err) = (std::io::stdout(), std::io::stderr());
    let status = match &cli.cmd {
        None => report_capture(capture(&cli).await, &mut out, &mut err),
        Some(Command::Test { dir }) => report(self_test(&cli, dir.clone()).await, "Camera test failed", &mut err),
        Some(Command::Doctor) => report(doctor(&cli).await, "doctor failed", &mut err),
    };
    ExitCode::from(status)
}

/// 0 on success, 1 for every failure.
fn exit_status<T>(res: &Result<T>) -> u8 {
    match res {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// Success line to `out`; diagnostic plus any install hint to `err`.
fn report_capture(res: Result<CaptureOutcome>, out: &mut impl Write, err: &mut impl Write) -> u8 {
    match &res {
        Ok(outcome) => {
            let _ = writeln!(out, "{outcome}");
        }
        Err(e) => write_failure(err, "Failed to capture image", e),
    }
    exit_status(&res)
}

fn report(res: Result<()>, what: &str, err: &mut impl Write) -> u8 {
    if let Err(e) = &res {
        write_failure(err, what, e);
    }
    exit_status(&res)
}

fn write_failure(err: &mut impl Write, what: &str, e: &anyhow::Error) {
    let _ = writeln!(err, "ERROR: {what}: {e:#}");
    if let Some(hint) = e.downcast_ref::<CaptureError>().and_then(CaptureError::install_hint) {
        let _ = writeln!(err, "{hint}");
    }
}

fn runner(cfg: &Resolved) -> CaptureRunner {
    CaptureRunner::new(backend(cfg.backend, &cfg.options), cfg.runner)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
    info!("interrupt: cancelling capture");
}

async fn capture(cli: &Cli) -> Result<CaptureOutcome> {
    let cfg = cli.resolve()?;
    let output = cli.output.as_ref().context("output path missing")?;
    let path = resolve_output(output, &cfg.template, time_now())?;
    let req = CaptureRequest::new(path, cfg.width, cfg.height)?;
    Ok(runner(&cfg).run_until(&req, shutdown_signal()).await?)
}

async fn self_test(cli: &Cli, dir: Option<PathBuf>) -> Result<()> {
    let cfg = cli.resolve()?;
    let scratch;
    let dir = match dir {
        Some(d) => {
            tokio::fs::create_dir_all(&d).await.with_context(|| format!("create {}", d.display()))?;
            d
        }
        None => {
            scratch = tempfile::tempdir().context("create scratch dir")?;
            scratch.path().to_path_buf()
        }
    };

    info!("test: capturing via {}", cfg.backend);
    let len = doctor::self_test(&runner(&cfg), &dir).await?;
    info!("test: {} byte frame", len);
    println!("Camera test successful");
    Ok(())
}

async fn doctor(cli: &Cli) -> Result<()> {
    info!("doctor: starting");
    let cfg = cli.resolve()?;
    doctor::check_settings(&cfg)?;
    let b = backend(cfg.backend, &cfg.options);
    doctor::check_backend(b.as_ref(), cfg.runner.step_timeout).await?;
    println!("doctor: OK");
    Ok(())
}

fn time_now() -> time::OffsetDateTime {
    time::OffsetDateTime::now_utc()
}
