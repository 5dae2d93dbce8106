use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pisnap_camera::request::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use pisnap_camera::runner::{DEFAULT_STEP_TIMEOUT, DEFAULT_WARMUP};
use pisnap_camera::{BackendKind, BackendOptions, FilenameTemplate, RunnerSettings};

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraCfg,
}

/// `[camera]` table. Every key is optional; command-line flags win.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraCfg {
    pub backend: Option<BackendKind>,
    pub camera: Option<u32>,
    pub device: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub warmup_ms: Option<u64>,
    /// 0 disables the per-step bound.
    pub step_timeout_s: Option<u64>,
    pub filename_format: Option<String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).context("parse config toml")
}

/// Command-line overrides, all optional.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Overrides {
    pub backend: Option<BackendKind>,
    pub camera: Option<u32>,
    pub device: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub warmup_ms: Option<u64>,
    pub step_timeout_s: Option<u64>,
}

/// Effective settings after flag > config > default.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub backend: BackendKind,
    pub options: BackendOptions,
    pub width: u32,
    pub height: u32,
    pub runner: RunnerSettings,
    pub template: FilenameTemplate,
}

impl Resolved {
    pub fn new(cli: &Overrides, file: &CameraCfg) -> Result<Self> {
        let defaults = BackendOptions::default();
        let warmup = cli
            .warmup_ms
            .or(file.warmup_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_WARMUP);
        let step_timeout = match cli.step_timeout_s.or(file.step_timeout_s) {
            Some(0) => None,
            Some(s) => Some(Duration::from_secs(s)),
            None => Some(DEFAULT_STEP_TIMEOUT),
        };
        let template = match &file.filename_format {
            Some(pattern) => FilenameTemplate::parse(pattern)?,
            None => FilenameTemplate::default(),
        };

        let resolved = Self {
            backend: cli.backend.or(file.backend).unwrap_or_default(),
            options: BackendOptions {
                camera: cli.camera.or(file.camera).unwrap_or(defaults.camera),
                device: cli.device.clone().or_else(|| file.device.clone()).unwrap_or(defaults.device),
            },
            width: cli.width.or(file.width).unwrap_or(DEFAULT_WIDTH),
            height: cli.height.or(file.height).unwrap_or(DEFAULT_HEIGHT),
            runner: RunnerSettings { warmup, step_timeout },
            template,
        };
        anyhow::ensure!(resolved.width > 0 && resolved.height > 0, "camera resolution must be positive");
        Ok(resolved)
    }
}
