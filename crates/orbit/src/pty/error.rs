use thiserror::Error;

/// Errors raised while spawning or driving a PTY process.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    Open(#[source] anyhow::Error),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("process input is closed")]
    InputClosed,

    #[error("failed to resize pty: {0}")]
    Resize(#[source] anyhow::Error),

    #[error("failed to signal process: {0}")]
    Kill(#[source] std::io::Error),

    /// The handle already ran a process to completion and cannot be reused.
    #[error("process handle is dead")]
    HandleDead,
}
