use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assistant::DEFAULT_COMPLETENESS_THRESHOLD;
use crate::pty::ProcessSpec;

/// Shell session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell program. Falls back to `$SHELL`, then `bash` (`powershell.exe` on Windows).
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Starting directory. Defaults to the broker's working directory.
    pub working_dir: Option<String>,
    /// `TERM` inside the PTY.
    pub term: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            working_dir: None,
            term: "xterm-color".to_string(),
        }
    }
}

impl ShellConfig {
    pub fn resolve_program(&self) -> String {
        self.program
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(default_shell)
    }

    /// Launch settings for a shell starting in `working_dir`, or the configured directory.
    pub fn process_spec(&self, working_dir: Option<&Path>) -> ProcessSpec {
        let cwd = working_dir
            .map(Path::to_path_buf)
            .or_else(|| self.working_dir.as_deref().map(expand_path));
        let mut spec = ProcessSpec::new(self.resolve_program())
            .with_args(self.args.iter().cloned())
            .with_cwd(cwd);
        spec.term = self.term.clone();
        spec
    }
}

/// Assistant CLI session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Start a shell and type the CLI command into it instead of running the
    /// CLI directly.
    pub launch_via_shell: bool,
    /// Environment variable that receives the client-supplied credential.
    pub credential_env: String,
    pub working_dir: Option<String>,
    /// Completeness (0 to 100) at which improvements are generated.
    pub completeness_threshold: u8,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            program: "gemini".to_string(),
            args: Vec::new(),
            launch_via_shell: true,
            credential_env: "GEMINI_API_KEY".to_string(),
            working_dir: None,
            completeness_threshold: DEFAULT_COMPLETENESS_THRESHOLD,
        }
    }
}

impl AssistantConfig {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn process_spec(&self, shell: &ShellConfig, credential: Option<&str>) -> ProcessSpec {
        let cwd = self.working_dir.as_deref().map(expand_path);
        let mut spec = if self.launch_via_shell {
            let mut spec = shell.process_spec(cwd.as_deref());
            spec.startup_input = Some(format!("{}\r", self.command_line()));
            spec
        } else {
            let mut spec = ProcessSpec::new(self.program.clone())
                .with_args(self.args.iter().cloned())
                .with_cwd(cwd);
            spec.term = shell.term.clone();
            spec
        };

        if let Some(credential) = credential.filter(|c| !c.is_empty()) {
            if !self.credential_env.is_empty() {
                spec.env
                    .insert(self.credential_env.clone(), credential.to_string());
            }
        }
        spec
    }
}

fn default_shell() -> String {
    if cfg!(windows) {
        return "powershell.exe".to_string();
    }
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "bash".to_string())
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
