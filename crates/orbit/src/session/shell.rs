use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use orbit_protocol::ServerMessage;

use super::SessionError;
use super::config::ShellConfig;
use super::output::{StreamForwarder, StreamKind};
use crate::pty::{ProcessHandle, PtySpawner, SpawnOutcome, TerminalSize};
use crate::ws::{ConnectionId, OutboundSink};

/// The interactive shell of one connection.
///
/// Outlives its processes: once a shell exits or is closed, the next
/// [`start`](Self::start) spawns a fresh one.
pub struct ShellSession {
    connection_id: ConnectionId,
    spawner: Arc<dyn PtySpawner>,
    config: ShellConfig,
    sink: OutboundSink,
    working_dir: Option<PathBuf>,
    handle: Option<ProcessHandle>,
}

impl ShellSession {
    pub fn new(
        connection_id: ConnectionId,
        spawner: Arc<dyn PtySpawner>,
        config: ShellConfig,
        sink: OutboundSink,
    ) -> Self {
        Self {
            connection_id,
            spawner,
            config,
            sink,
            working_dir: None,
            handle: None,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.handle.as_ref().is_some_and(ProcessHandle::is_live)
    }

    /// Spawn the shell and announce `terminal:ready`.
    ///
    /// A no-op while a shell is already running.
    pub fn start(&mut self, size: TerminalSize) -> Result<SpawnOutcome, SessionError> {
        if self.is_live() {
            warn!(
                "shell already running for connection {}, ignoring start",
                self.connection_id
            );
            return Ok(SpawnOutcome::AlreadyLive);
        }

        let spec = self.config.process_spec(self.working_dir.as_deref());
        let mut handle = ProcessHandle::new("shell", self.spawner.clone(), spec);
        let outcome = handle.spawn(size, StreamForwarder::new(StreamKind::Shell, self.sink.clone()))?;

        info!("shell started for connection {}", self.connection_id);
        self.handle = Some(handle);
        self.sink.send(ServerMessage::TerminalReady);
        Ok(outcome)
    }

    pub fn input(&mut self, data: &str) {
        match self.handle.as_mut() {
            Some(handle) => handle.write(data.as_bytes()),
            None => debug!("no shell for connection {}, dropping input", self.connection_id),
        }
    }

    pub fn resize(&mut self, size: TerminalSize) {
        if let Some(handle) = self.handle.as_mut() {
            handle.resize(size);
        }
    }

    /// Change directory in the running shell and remember it for later starts.
    pub fn set_working_dir(&mut self, path: &str) -> Result<(), SessionError> {
        let command = cd_command(path)?;
        self.working_dir = Some(PathBuf::from(path));
        if let Some(handle) = self.handle.as_mut() {
            handle.write(command.as_bytes());
        }
        self.sink.send(ServerMessage::WorkingDir {
            path: path.to_string(),
        });
        Ok(())
    }

    /// Kill the shell, if any. Always safe.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.kill();
            info!("shell closed for connection {}", self.connection_id);
        }
    }
}

fn cd_command(path: &str) -> Result<String, SessionError> {
    if path.trim().is_empty() || path.contains('"') || path.chars().any(char::is_control) {
        return Err(SessionError::InvalidWorkingDir(path.to_string()));
    }
    let newline = if cfg!(windows) { "\r" } else { "\n" };
    Ok(format!("cd \"{path}\"{newline}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cd_command_quotes_path() {
        let command = cd_command("/home/me/my project").unwrap();
        assert!(command.starts_with("cd \"/home/me/my project\""));
    }

    #[test]
    fn test_cd_command_rejects_injection() {
        assert!(cd_command("").is_err());
        assert!(cd_command("/tmp\"; rm -rf ~").is_err());
        assert!(cd_command("/tmp\nwhoami").is_err());
    }
}
