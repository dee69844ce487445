use crate::domain::{LatticeError, LatticeResult};
use crate::modules::SimulationRunner;
use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// An external program invocation with optional stdin/stdout redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub stdin: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            stdin: None,
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Shell-like rendering used in logs.
    pub fn display_line(&self) -> String {
        let mut line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(stdin) = &self.stdin {
            line.push_str(&format!(" < {}", stdin.display()));
        }
        if let Some(stdout) = &self.stdout {
            line.push_str(&format!(" > {}", stdout.display()));
        }
        line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn status_text(&self) -> String {
        self.exit_code.map_or_else(
            || "terminated by signal".to_string(),
            |code| format!("exit code {}", code),
        )
    }
}

/// Runs commands with `std::process::Command`, blocking until exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl SimulationRunner for ShellRunner {
    fn run(&self, spec: &CommandSpec) -> LatticeResult<CommandOutcome> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);

        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        if let Some(path) = &spec.stdin {
            let file = File::open(path).map_err(|source| {
                LatticeError::io_system(
                    "IO.EXTERNAL_PROCESS_STDIN",
                    format!("failed to open '{}' for stdin: {}", path.display(), source),
                )
            })?;
            command.stdin(Stdio::from(file));
        }

        if let Some(path) = &spec.stdout {
            let file = File::create(path).map_err(|source| {
                LatticeError::io_system(
                    "IO.EXTERNAL_PROCESS_STDOUT",
                    format!("failed to create '{}' for stdout: {}", path.display(), source),
                )
            })?;
            command.stdout(Stdio::from(file));
        }

        tracing::debug!(command = %spec.display_line(), "running external process");
        let status = command.status().map_err(|source| {
            LatticeError::io_system(
                "IO.EXTERNAL_PROCESS_EXEC",
                format!("failed to execute '{}': {}", spec.program, source),
            )
        })?;

        Ok(CommandOutcome {
            exit_code: status.code(),
        })
    }
}
