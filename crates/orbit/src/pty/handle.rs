use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ProcessEvent, ProcessSpec, PtyError, PtyProcess, PtySpawner, SpawnedProcess, TerminalSize};

/// Receives what a process emits while its handle is live.
pub trait ProcessObserver: Send + 'static {
    fn on_output(&mut self, chunk: Vec<u8>);

    /// Called exactly once per spawned process, after the last forwarded
    /// output chunk.
    fn on_exit(&mut self, code: i32);
}

/// Exit code reported when a process is killed through its handle
/// (128 + SIGHUP, the signal the kill delivers).
pub const KILLED_EXIT_CODE: i32 = 129;

type SharedObserver = Arc<Mutex<Option<Box<dyn ProcessObserver>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Spawned,
    /// A process was already running; nothing was started.
    AlreadyLive,
}

enum HandleState {
    Idle,
    Live {
        process: Box<dyn PtyProcess>,
        pump: JoinHandle<()>,
        observer: SharedObserver,
    },
    Dead,
}

/// Owns at most one PTY process over its lifetime.
///
/// A handle starts idle, becomes live on [`spawn`](Self::spawn) and is dead
/// once killed. A dead handle is never reused. Killing stops output
/// forwarding and reports [`KILLED_EXIT_CODE`] to the observer right away;
/// the dying process's own exit status is dropped.
pub struct ProcessHandle {
    label: &'static str,
    spawner: Arc<dyn PtySpawner>,
    spec: ProcessSpec,
    state: HandleState,
    alive: Arc<AtomicBool>,
}

impl ProcessHandle {
    pub fn new(label: &'static str, spawner: Arc<dyn PtySpawner>, spec: ProcessSpec) -> Self {
        Self {
            label,
            spawner,
            spec,
            state: HandleState::Idle,
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Start the process and route its events to `observer`.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn spawn<O: ProcessObserver>(
        &mut self,
        size: TerminalSize,
        observer: O,
    ) -> Result<SpawnOutcome, PtyError> {
        match &self.state {
            HandleState::Idle => {}
            HandleState::Live { .. } if self.is_live() => {
                warn!("{} process already running, ignoring spawn", self.label);
                return Ok(SpawnOutcome::AlreadyLive);
            }
            HandleState::Live { .. } | HandleState::Dead => return Err(PtyError::HandleDead),
        }

        let SpawnedProcess {
            mut process,
            events,
        } = self.spawner.spawn(&self.spec, size)?;
        info!(
            "{} process started: {} (pid {:?})",
            self.label,
            self.spec.program,
            process.pid()
        );

        self.alive.store(true, Ordering::SeqCst);
        let observer: Box<dyn ProcessObserver> = Box::new(observer);
        let observer: SharedObserver = Arc::new(Mutex::new(Some(observer)));
        let pump = tokio::spawn(pump_events(
            self.label,
            events,
            observer.clone(),
            self.alive.clone(),
        ));

        if let Some(input) = &self.spec.startup_input {
            if let Err(e) = process.write(input.as_bytes()) {
                warn!("failed to send startup input to {}: {}", self.label, e);
            }
        }

        self.state = HandleState::Live {
            process,
            pump,
            observer,
        };
        Ok(SpawnOutcome::Spawned)
    }

    /// True while a spawned process has neither exited nor been killed.
    pub fn is_live(&self) -> bool {
        matches!(self.state, HandleState::Live { .. }) && self.alive.load(Ordering::SeqCst)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.state, HandleState::Dead)
    }

    /// Forward input to the process. Silently dropped when nothing is live.
    pub fn write(&mut self, bytes: &[u8]) {
        let label = self.label;
        if let Some(process) = self.live_process() {
            if let Err(e) = process.write(bytes) {
                warn!("failed to write to {} process: {}", label, e);
            }
        }
    }

    /// Resize the PTY. Silently dropped when nothing is live.
    pub fn resize(&mut self, size: TerminalSize) {
        let label = self.label;
        if let Some(process) = self.live_process() {
            if let Err(e) = process.resize(size) {
                warn!("failed to resize {} pty: {}", label, e);
            }
        }
    }

    /// Terminate the process, if any, and mark the handle dead.
    ///
    /// Idempotent. An idle handle stays idle. The exit is reported here unless
    /// the process had already exited on its own.
    pub fn kill(&mut self) {
        if matches!(self.state, HandleState::Idle) {
            return;
        }
        let was_alive = self.alive.swap(false, Ordering::SeqCst);
        if let HandleState::Live {
            mut process,
            pump,
            observer,
        } = std::mem::replace(&mut self.state, HandleState::Dead)
        {
            pump.abort();
            if was_alive {
                debug!("killing {} process (pid {:?})", self.label, process.pid());
                if let Err(e) = process.kill() {
                    warn!("failed to kill {} process: {}", self.label, e);
                }
            }
            let observer = lock_observer(&observer).take();
            if let Some(mut observer) = observer {
                observer.on_exit(KILLED_EXIT_CODE);
            }
        }
    }

    fn live_process(&mut self) -> Option<&mut Box<dyn PtyProcess>> {
        if !self.alive.load(Ordering::SeqCst) {
            return None;
        }
        match &mut self.state {
            HandleState::Live { process, .. } => Some(process),
            _ => None,
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

fn lock_observer(
    observer: &Mutex<Option<Box<dyn ProcessObserver>>>,
) -> MutexGuard<'_, Option<Box<dyn ProcessObserver>>> {
    observer.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn pump_events(
    label: &'static str,
    mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    observer: SharedObserver,
    alive: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Output(chunk) => {
                if let Some(observer) = lock_observer(&observer).as_mut() {
                    observer.on_output(chunk);
                }
            }
            ProcessEvent::Exit(code) => {
                info!("{} process exited with code {}", label, code);
                // Taken before liveness drops, so a racing kill finds nothing to report.
                let taken = lock_observer(&observer).take();
                alive.store(false, Ordering::SeqCst);
                if let Some(mut observer) = taken {
                    observer.on_exit(code);
                }
                return;
            }
        }
    }
    debug!("{} event stream closed without exit status", label);
    alive.store(false, Ordering::SeqCst);
}
