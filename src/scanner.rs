//! Single-slot supervisor for the external scanner script.
//!
//! At most one child is tracked. The slot lives behind a mutex so that
//! concurrent start/stop requests are serialized instead of racing.

use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Scanner ya está en ejecución")]
    AlreadyRunning,

    #[error("No hay scanner activo")]
    NotRunning,

    #[error("scanner command is empty")]
    EmptyCommand,

    #[error("scanner process error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ScannerSupervisor {
    /// Program followed by its leading arguments; the token is appended last.
    command: Vec<String>,
    slot: Mutex<Option<Child>>,
}

impl ScannerSupervisor {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            slot: Mutex::new(None),
        }
    }

    /// Spawns `<command…> <token>` unless a live child is already tracked.
    /// Returns the pid of the new child.
    pub async fn start(&self, token: &str) -> Result<Option<u32>, ScannerError> {
        let mut slot = self.slot.lock().await;

        if let Some(child) = slot.as_mut() {
            match child.try_wait()? {
                None => return Err(ScannerError::AlreadyRunning),
                Some(status) => info!(%status, "reaping exited scanner process"),
            }
        }

        let (program, args) = self
            .command
            .split_first()
            .ok_or(ScannerError::EmptyCommand)?;

        let child = Command::new(program)
            .args(args)
            .arg(token)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        info!(?pid, program = %program, "scanner started");
        *slot = Some(child);
        Ok(pid)
    }

    /// Kills the tracked child and waits for it.
    pub async fn stop(&self) -> Result<ExitStatus, ScannerError> {
        let mut slot = self.slot.lock().await;
        let mut child = slot.take().ok_or(ScannerError::NotRunning)?;

        if let Err(e) = child.start_kill() {
            // already exited; wait() below still collects the status
            warn!(error = %e, "scanner kill failed");
        }
        let status = child.wait().await?;
        info!(%status, "scanner stopped");
        Ok(status)
    }

    pub async fn is_running(&self) -> bool {
        let mut slot = self.slot.lock().await;
        match slot.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}
