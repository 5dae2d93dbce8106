//! A long-running capture helper (`rpicam-still`, `ffmpeg`) streaming frames
//! into a private staging directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{CaptureError, Result};

const POLL: Duration = Duration::from_millis(50);
const LOG_TAIL: usize = 400;
/// Used where procfs cannot tell whether a handler is installed yet.
const SETTLE: Duration = Duration::from_millis(500);

#[cfg(unix)]
pub(crate) use nix::sys::signal::Signal;

#[cfg(not(unix))]
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    SIGINT = 2,
    SIGUSR1 = 10,
    SIGUSR2 = 12,
}

/// Owns the staging directory and, once started, the helper process.
/// Dropping it kills the helper and removes the staging directory.
pub(crate) struct Helper {
    staging: TempDir,
    child: Option<Child>,
}

impl Helper {
    pub fn new() -> Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix("pisnap-")
            .tempdir()
            .map_err(|e| CaptureError::io("create staging dir", e))?;
        Ok(Self { staging, child: None })
    }

    pub fn frame_path(&self) -> PathBuf {
        self.staging.path().join("frame.jpg")
    }

    fn log_path(&self) -> PathBuf {
        self.staging.path().join("helper.log")
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn child(&self) -> Option<&Child> {
        self.child.as_ref()
    }

    /// Spawns `cmd` with stdout/stderr redirected into the staging log.
    pub fn spawn(&mut self, mut cmd: Command, install_hint: &str) -> Result<()> {
        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        let log = std::fs::File::create(self.log_path())
            .map_err(|e| CaptureError::io("create helper log", e))?;
        let log_err = log
            .try_clone()
            .map_err(|e| CaptureError::io("create helper log", e))?;

        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);

        debug!("helper: spawning {:?}", cmd.as_std());
        let child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => CaptureError::DependencyMissing {
                tool: program.clone(),
                install_hint: install_hint.to_string(),
            },
            _ => CaptureError::DeviceUnavailable(format!("spawn {program}: {e}")),
        })?;
        self.child = Some(child);
        Ok(())
    }

    /// Waits until the staging file holds a complete JPEG and returns it.
    /// `Err(log tail)` when the helper exits first.
    pub async fn wait_for_frame(&mut self) -> std::result::Result<Vec<u8>, String> {
        let frame = self.frame_path();
        loop {
            if let Some(bytes) = read_complete_jpeg(&frame).await {
                return Ok(bytes);
            }
            self.ensure_alive().await?;
            tokio::time::sleep(POLL).await;
        }
    }

    /// Waits until the helper has a handler installed for `sig`; before that
    /// the default action would kill it. Reads `SigCgt` from procfs, and falls
    /// back to a fixed settle time where that is not available.
    pub async fn wait_until_catches(&mut self, sig: Signal) -> std::result::Result<(), String> {
        loop {
            self.ensure_alive().await?;
            let Some(pid) = self.child.as_ref().and_then(Child::id) else {
                return Err("helper not running".into());
            };
            match catches_signal(pid, sig).await {
                Some(true) => return Ok(()),
                Some(false) => tokio::time::sleep(POLL).await,
                None => {
                    tokio::time::sleep(SETTLE).await;
                    return self.ensure_alive().await;
                }
            }
        }
    }

    /// `Err(log tail)` once the helper has exited.
    async fn ensure_alive(&mut self) -> std::result::Result<(), String> {
        let Some(child) = self.child.as_mut() else {
            return Err("helper not running".into());
        };
        match child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => {
                self.child = None;
                Err(format!("helper exited ({status}): {}", self.log_tail().await))
            }
            Err(e) => Err(format!("helper status: {e}")),
        }
    }

    /// Sends `signal` and waits up to `grace` for exit before killing.
    pub async fn terminate(&mut self, signal: Option<Signal>, grace: Duration) -> Result<()> {
        let Some(mut child) = self.child.take() else { return Ok(()); };

        if let Some(sig) = signal {
            if let Err(e) = send_signal(&child, sig) {
                debug!("helper: signal {:?} failed: {}", sig, e);
            } else if let Ok(res) = tokio::time::timeout(grace, child.wait()).await {
                let status = res.map_err(|e| CaptureError::io("wait helper", e))?;
                debug!("helper: exited {}", status);
                return Ok(());
            }
            warn!("helper: no exit after {:?}, killing", grace);
        }

        child
            .kill()
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("kill helper: {e}")))
    }

    pub async fn log_tail(&self) -> String {
        let log = tokio::fs::read_to_string(self.log_path()).await.unwrap_or_default();
        let log = log.trim();
        let start = log
            .char_indices()
            .rev()
            .nth(LOG_TAIL)
            .map(|(i, _)| i)
            .unwrap_or(0);
        log[start..].replace('\n', " | ")
    }
}

/// SOI .. EOI check; helpers write the staging file in place.
pub(crate) fn is_complete_jpeg(bytes: &[u8]) -> bool {
    bytes.len() > 4 && bytes.starts_with(&[0xFF, 0xD8]) && bytes.ends_with(&[0xFF, 0xD9])
}

async fn read_complete_jpeg(path: &Path) -> Option<Vec<u8>> {
    let bytes = tokio::fs::read(path).await.ok()?;
    is_complete_jpeg(&bytes).then_some(bytes)
}

/// `None` when procfs has no answer (non-Linux hosts, helper just reaped).
async fn catches_signal(pid: u32, sig: Signal) -> Option<bool> {
    let status = tokio::fs::read_to_string(format!("/proc/{pid}/status")).await.ok()?;
    let mask = status.lines().find_map(|l| l.strip_prefix("SigCgt:"))?;
    let mask = u64::from_str_radix(mask.trim(), 16).ok()?;
    Some(mask & signal_bit(sig) != 0)
}

fn signal_bit(sig: Signal) -> u64 {
    1u64 << (sig as i32 - 1)
}

#[cfg(unix)]
pub(crate) fn send_signal(child: &Child, sig: Signal) -> std::io::Result<()> {
    use nix::unistd::Pid;

    let pid = child
        .id()
        .ok_or_else(|| std::io::Error::new(ErrorKind::Other, "helper already reaped"))?;
    let pid = i32::try_from(pid).map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e))?;
    nix::sys::signal::kill(Pid::from_raw(pid), sig).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
pub(crate) fn send_signal(_child: &Child, _sig: Signal) -> std::io::Result<()> {
    Err(std::io::Error::new(ErrorKind::Unsupported, "signals need a unix host"))
}
