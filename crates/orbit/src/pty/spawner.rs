use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::sync::mpsc;

use super::PtyError;

/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub const DEFAULT: TerminalSize = TerminalSize { cols: 80, rows: 24 };

    /// Returns `None` when either dimension is zero.
    pub fn new(cols: u16, rows: u16) -> Option<Self> {
        (cols > 0 && rows > 0).then_some(Self { cols, rows })
    }

    /// Fill missing dimensions from [`TerminalSize::DEFAULT`].
    pub fn or_default(cols: Option<u16>, rows: Option<u16>) -> Option<Self> {
        Self::new(
            cols.unwrap_or(Self::DEFAULT.cols),
            rows.unwrap_or(Self::DEFAULT.rows),
        )
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<TerminalSize> for portable_pty::PtySize {
    fn from(size: TerminalSize) -> Self {
        portable_pty::PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// Everything needed to launch one program on a PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Added on top of the broker's own environment.
    pub env: BTreeMap<String, String>,
    /// Value of `TERM` inside the PTY.
    pub term: String,
    /// Typed into the process right after it starts.
    pub startup_input: Option<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            term: "xterm-color".to_string(),
            startup_input: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Something the process did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Output(Vec<u8>),
    /// Always the last event on the channel.
    Exit(i32),
}

/// Control side of a running PTY process.
pub trait PtyProcess: Send {
    fn pid(&self) -> Option<u32>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), PtyError>;

    fn resize(&mut self, size: TerminalSize) -> Result<(), PtyError>;

    /// Ask the process to terminate. Implementations escalate to a forced kill
    /// if the process ignores the request.
    fn kill(&mut self) -> Result<(), PtyError>;
}

/// A freshly spawned process and the receiving end of its event stream.
pub struct SpawnedProcess {
    pub process: Box<dyn PtyProcess>,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
}

/// Starts programs on pseudo-terminals.
pub trait PtySpawner: Send + Sync {
    fn spawn(&self, spec: &ProcessSpec, size: TerminalSize) -> Result<SpawnedProcess, PtyError>;
}
