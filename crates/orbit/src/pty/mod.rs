//! Pseudo-terminal process management.
//!
//! [`PtySpawner`] starts a program attached to a PTY and hands back a
//! [`PtyProcess`] control plus a stream of [`ProcessEvent`]s. [`ProcessHandle`]
//! wraps that pair with the idle/live/dead lifecycle every session relies on.

mod error;
mod handle;
mod native;
mod spawner;
mod utf8;

pub use error::PtyError;
pub use handle::{KILLED_EXIT_CODE, ProcessHandle, ProcessObserver, SpawnOutcome};
pub use native::{DEFAULT_KILL_GRACE, NativePtySpawner, ProcessConfig};
pub use spawner::{ProcessEvent, ProcessSpec, PtyProcess, PtySpawner, SpawnedProcess, TerminalSize};
pub use utf8::Utf8Decoder;
