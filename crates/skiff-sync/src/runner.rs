//! Cancellable streamed execution of mutating operations.
//!
//! One spawned task owns the child process for the whole operation, so a
//! cancel request can never race a concurrent reader of the handle. The
//! teardown order is fixed: subprocess confirmed exited, reader tasks
//! drained to EOF, write lock released, terminal outcome published.
//!
//! Cancellation is forceful. The token kills the child at the OS level;
//! there is no cooperative checkpoint the subprocess polls.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use skiff_git::{GitCommand, SPAWN_FAILURE_CODE};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::events::{EventBus, UpdateEvent};
use crate::progress::ProgressCoalescer;
use crate::write_lock::WriteGuard;

/// Terminal state of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The tool ran and exited zero.
    Completed,
    /// The tool ran and reported failure; output was captured as-is.
    RuntimeFailed { code: i32 },
    /// Killed at the user's request. Deliberately distinct from
    /// `RuntimeFailed` so the UI never renders a cancellation as an error.
    Cancelled,
    /// The tool never started (missing binary, permission denied).
    /// Surfaces as exit code −1.
    SpawnFailed,
}

impl OperationOutcome {
    pub fn success(&self) -> bool {
        matches!(self, OperationOutcome::Completed)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            OperationOutcome::Completed => 0,
            OperationOutcome::RuntimeFailed { code } => *code,
            OperationOutcome::Cancelled => SPAWN_FAILURE_CODE,
            OperationOutcome::SpawnFailed => SPAWN_FAILURE_CODE,
        }
    }
}

/// Caller-side handle to a running operation.
#[derive(Debug)]
pub struct OperationHandle {
    token: CancellationToken,
    outcome: watch::Receiver<Option<OperationOutcome>>,
    output: Arc<Mutex<String>>,
}

impl OperationHandle {
    /// Request forceful cancellation: the live subprocess is killed at the
    /// OS level. Idempotent; a no-op once the operation is terminal.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the terminal outcome.
    pub async fn wait(&mut self) -> OperationOutcome {
        loop {
            if let Some(outcome) = self.outcome.borrow().clone() {
                return outcome;
            }
            if self.outcome.changed().await.is_err() {
                // Runner task died without reporting. Contained defect,
                // surfaced as a runtime failure rather than a hang.
                error!(event = "sync.runner.worker_lost");
                return OperationOutcome::RuntimeFailed {
                    code: SPAWN_FAILURE_CODE,
                };
            }
        }
    }

    /// Terminal outcome, if the operation has reached one.
    pub fn outcome(&self) -> Option<OperationOutcome> {
        self.outcome.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Latest full-buffer snapshot of the coalesced output log.
    pub fn output(&self) -> String {
        self.output
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default()
    }
}

/// Launch a streamed operation under an already-acquired write guard.
///
/// The guard travels into the runner task and is dropped only after the
/// subprocess is confirmed dead or exited and its output fully drained;
/// the outcome is published after the release, so an observer of the
/// terminal state can always re-acquire the lock.
pub(crate) fn spawn_streamed(
    command: GitCommand,
    output_event: UpdateEvent,
    bus: EventBus,
    guard: WriteGuard,
) -> OperationHandle {
    let token = CancellationToken::new();
    let (outcome_tx, outcome_rx) = watch::channel(None);
    let output = Arc::new(Mutex::new(String::new()));

    let task_token = token.clone();
    let task_output = Arc::clone(&output);
    let task_bus = bus.clone();
    tokio::spawn(async move {
        let outcome = run_operation(
            &command,
            output_event,
            &task_bus,
            task_token,
            task_output,
        )
        .await;

        info!(
            event = "sync.runner.operation_finished",
            command = %command.describe(),
            outcome = ?outcome,
        );

        drop(guard);
        let _ = outcome_tx.send(Some(outcome));
        task_bus.emit(output_event);
    });

    OperationHandle {
        token,
        outcome: outcome_rx,
        output,
    }
}

async fn run_operation(
    command: &GitCommand,
    output_event: UpdateEvent,
    bus: &EventBus,
    token: CancellationToken,
    output: Arc<Mutex<String>>,
) -> OperationOutcome {
    info!(
        event = "sync.runner.spawn_started",
        command = %command.describe(),
        path = %command.dir.display()
    );

    let mut child = match tokio::process::Command::new(&command.program)
        .current_dir(&command.dir)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!(
                event = "sync.runner.spawn_failed",
                command = %command.describe(),
                error = %e
            );
            return OperationOutcome::SpawnFailed;
        }
    };

    let coalescer = Arc::new(Mutex::new(ProgressCoalescer::new()));
    let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(
            stdout,
            Arc::clone(&coalescer),
            Arc::clone(&output),
            bus.clone(),
            output_event,
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(
            stderr,
            Arc::clone(&coalescer),
            Arc::clone(&output),
            bus.clone(),
            output_event,
        ));
    }

    let mut cancelled = false;
    let status = tokio::select! {
        status = child.wait() => status,
        _ = token.cancelled() => {
            info!(event = "sync.runner.cancel_requested", command = %command.describe());
            if let Err(e) = child.kill().await {
                warn!(event = "sync.runner.kill_failed", error = %e);
            }
            cancelled = true;
            child.wait().await
        }
    };

    // Drain both pipes to EOF before recording the outcome, so a consumer
    // of the terminal state never observes a torn output buffer.
    for reader in readers {
        if let Err(e) = reader.await {
            error!(event = "sync.runner.reader_panicked", error = %e);
        }
    }

    match status {
        Err(e) => {
            error!(event = "sync.runner.wait_failed", error = %e);
            if cancelled {
                OperationOutcome::Cancelled
            } else {
                OperationOutcome::RuntimeFailed {
                    code: SPAWN_FAILURE_CODE,
                }
            }
        }
        Ok(_) if cancelled => OperationOutcome::Cancelled,
        Ok(status) if status.success() => OperationOutcome::Completed,
        Ok(status) => {
            // code() is None when the process died to a signal we didn't send
            let code = status.code().unwrap_or(SPAWN_FAILURE_CODE);
            warn!(
                event = "sync.runner.runtime_failed",
                command = %command.describe(),
                code = code
            );
            OperationOutcome::RuntimeFailed { code }
        }
    }
}

/// Pump one pipe into the shared coalescer. Every visible change replaces
/// the whole output buffer and pings the bus so the renderer shows live
/// progress.
fn spawn_reader(
    mut stream: impl AsyncRead + Unpin + Send + 'static,
    coalescer: Arc<Mutex<ProgressCoalescer>>,
    output: Arc<Mutex<String>>,
    bus: EventBus,
    output_event: UpdateEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]);
                    let snapshot = match coalescer.lock() {
                        Ok(mut c) => c.feed(&chunk).then(|| c.snapshot()),
                        Err(_) => None,
                    };
                    if let Some(snapshot) = snapshot {
                        if let Ok(mut buffer) = output.lock() {
                            *buffer = snapshot;
                        }
                        bus.emit(output_event);
                    }
                }
                Err(e) => {
                    warn!(event = "sync.runner.read_failed", error = %e);
                    break;
                }
            }
        }
    })
}
