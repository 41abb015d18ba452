//! PTY processes backed by the operating system via `portable-pty`.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, warn};
use portable_pty::{ChildKiller, CommandBuilder, MasterPty, native_pty_system};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{ProcessEvent, ProcessSpec, PtyError, PtyProcess, PtySpawner, SpawnedProcess, TerminalSize};

/// Time a process gets to exit after SIGHUP before it is killed outright.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

/// Upper bound on waiting for buffered output after the child has exited.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

const READ_BUFFER_SIZE: usize = 8192;

/// Process supervision settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Milliseconds between the polite termination request and SIGKILL.
    pub kill_grace_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            kill_grace_ms: DEFAULT_KILL_GRACE.as_millis() as u64,
        }
    }
}

impl ProcessConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Spawns processes on real pseudo-terminals.
///
/// Must be used from inside a Tokio runtime: reading, writing and reaping each
/// run on their own tasks.
#[derive(Debug, Clone)]
pub struct NativePtySpawner {
    kill_grace: Duration,
}

impl NativePtySpawner {
    pub fn new(config: &ProcessConfig) -> Self {
        Self {
            kill_grace: config.kill_grace(),
        }
    }
}

impl Default for NativePtySpawner {
    fn default() -> Self {
        Self::new(&ProcessConfig::default())
    }
}

impl PtySpawner for NativePtySpawner {
    fn spawn(&self, spec: &ProcessSpec, size: TerminalSize) -> Result<SpawnedProcess, PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system.openpty(size.into()).map_err(PtyError::Open)?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", &spec.term);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|source| PtyError::Spawn {
                program: spec.program.clone(),
                source,
            })?;
        // The child holds its own copy of the slave side.
        drop(pair.slave);

        let pid = child.process_id();
        let mut killer = child.clone_killer();

        let streams = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (mut reader, mut writer) = match streams {
            Ok(streams) => streams,
            Err(err) => {
                let _ = killer.kill();
                return Err(PtyError::Open(err));
            }
        };

        debug!("spawned {} (pid {:?}) at {}x{}", spec.program, pid, size.cols, size.rows);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let output_tx = event_tx.clone();
        let reader_handle = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.send(ProcessEvent::Output(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                        continue;
                    }
                    // EIO once the slave side is gone.
                    Err(_) => break,
                }
            }
        });

        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::task::spawn_blocking(move || {
            while let Some(bytes) = input_rx.blocking_recv() {
                if let Err(e) = writer.write_all(&bytes).and_then(|()| writer.flush()) {
                    debug!("pty write failed: {}", e);
                    break;
                }
            }
        });

        let exited = Arc::new(AtomicBool::new(false));
        let wait_exited = exited.clone();
        tokio::spawn(async move {
            let code = tokio::task::spawn_blocking(move || match child.wait() {
                Ok(status) => status.exit_code() as i32,
                Err(_) => -1,
            })
            .await
            .unwrap_or(-1);
            wait_exited.store(true, Ordering::SeqCst);
            let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader_handle).await;
            let _ = event_tx.send(ProcessEvent::Exit(code));
        });

        Ok(SpawnedProcess {
            process: Box::new(NativePty {
                pid,
                master: pair.master,
                input: input_tx,
                killer,
                exited,
                kill_grace: self.kill_grace,
            }),
            events: event_rx,
        })
    }
}

struct NativePty {
    pid: Option<u32>,
    master: Box<dyn MasterPty + Send>,
    input: mpsc::UnboundedSender<Vec<u8>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    exited: Arc<AtomicBool>,
    kill_grace: Duration,
}

impl NativePty {
    fn schedule_forced_kill(&self) {
        let Some(pid) = self.pid else {
            return;
        };
        let exited = self.exited.clone();
        let grace = self.kill_grace;
        let escalate = move || {
            if !exited.load(Ordering::SeqCst) {
                force_kill(pid);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(grace).await;
                    escalate();
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(grace);
                    escalate();
                });
            }
        }
    }
}

impl PtyProcess for NativePty {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), PtyError> {
        self.input
            .send(bytes.to_vec())
            .map_err(|_| PtyError::InputClosed)
    }

    fn resize(&mut self, size: TerminalSize) -> Result<(), PtyError> {
        self.master.resize(size.into()).map_err(PtyError::Resize)
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        if self.exited.load(Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.killer.kill();
        self.schedule_forced_kill();
        result.map_err(PtyError::Kill)
    }
}

#[cfg(unix)]
fn force_kill(pid: u32) {
    use rustix::process::{Pid, Signal, kill_process};

    let Some(target) = i32::try_from(pid).ok().and_then(Pid::from_raw) else {
        return;
    };
    match kill_process(target, Signal::KILL) {
        Ok(()) => warn!("process {} ignored termination, sent SIGKILL", pid),
        Err(e) => debug!("SIGKILL to {} failed: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn force_kill(pid: u32) {
    debug!("no forced kill available for process {}", pid);
}
