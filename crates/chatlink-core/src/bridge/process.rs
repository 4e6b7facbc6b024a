//! Bridge process spawning and I/O.
//!
//! Spawns the sidecar with piped stdio and turns its output into a stream
//! of [`ProcessEvent`]s:
//! - one task per output pipe, forwarding complete lines
//! - one task owning the child, reporting its exit
//!
//! Stopping sends SIGINT first (on Unix) and force-kills after a grace
//! period.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

use super::{BridgeConfig, BridgeError};
use crate::shell::build_command;

/// How long the bridge gets to exit after SIGINT.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Exit status of the bridge process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeExit {
    pub code: Option<i32>,
}

impl std::fmt::Display for BridgeExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Output from the bridge process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    Exit(BridgeExit),
}

/// A running bridge process.
pub struct BridgeProcess {
    stdin: Mutex<ChildStdin>,
    stop_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    running: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
}

impl BridgeProcess {
    /// Spawn the bridge. Returns the handle and its output stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: &BridgeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ProcessEvent>), BridgeError> {
        let cmd = build_command(
            &config.binary_path,
            &config.args,
            config.working_dir.as_deref(),
            config.shell_prefix.as_deref(),
        )
        .map_err(BridgeError::Command)?;

        let mut cmd = Command::from(cmd);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(BridgeError::Spawn)?;
        log::info!(
            "Spawned bridge {} (pid {:?})",
            config.binary_path,
            child.id()
        );

        let missing = |pipe: &str| {
            BridgeError::Spawn(std::io::Error::other(format!("Failed to capture {pipe}")))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let (tx, rx) = mpsc::unbounded_channel();

        let tx_stdout = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx_stdout.send(ProcessEvent::Stdout(line)).is_err() {
                    break;
                }
            }
        });

        let tx_stderr = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx_stderr.send(ProcessEvent::Stderr(line)).is_err() {
                    break;
                }
            }
        });

        let running = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = oneshot::channel();
        let running_exit = Arc::clone(&running);
        tokio::spawn(async move {
            let exit = watch_exit(child, stop_rx).await;
            running_exit.store(false, Ordering::Release);
            let _ = tx.send(ProcessEvent::Exit(exit));
        });

        Ok((
            Self {
                stdin: Mutex::new(stdin),
                stop_tx: std::sync::Mutex::new(Some(stop_tx)),
                running,
                stopping: Arc::new(AtomicBool::new(false)),
            },
            rx,
        ))
    }

    /// Write one line to the bridge's stdin.
    pub async fn write_line(&self, line: &str) -> Result<(), BridgeError> {
        if !self.is_running() {
            return Err(BridgeError::NotRunning);
        }
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(BridgeError::Write)?;
        stdin.write_all(b"\n").await.map_err(BridgeError::Write)?;
        stdin.flush().await.map_err(BridgeError::Write)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Flag shared with the output pump; set once a stop was requested so the
    /// resulting exit is not mistaken for a crash.
    pub fn stopping_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopping)
    }

    /// Treat the next exit as intentional without signalling the process.
    pub fn mark_stopping(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    /// Ask the process to stop. Returns immediately; the exit is reported on
    /// the event stream.
    pub fn stop(&self) {
        self.mark_stopping();
        let sender = self.stop_tx.lock().unwrap().take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Wait for the child to exit, or stop it when asked.
async fn watch_exit(mut child: Child, stop_rx: oneshot::Receiver<()>) -> BridgeExit {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = stop_rx => terminate(&mut child).await,
    };
    match status {
        Ok(status) => BridgeExit {
            code: status.code(),
        },
        Err(e) => {
            log::warn!("Failed to wait for bridge: {}", e);
            BridgeExit { code: None }
        }
    }
}

async fn terminate(child: &mut Child) -> std::io::Result<std::process::ExitStatus> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGINT);
            }
            if let Ok(status) = tokio::time::timeout(STOP_GRACE, child.wait()).await {
                return status;
            }
            log::warn!("Bridge ignored SIGINT; killing");
        }
    }

    child.kill().await?;
    child.wait().await
}

// ============================================================================
// TESTS
// ============================================================================
