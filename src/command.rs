use crate::env::Environment;
use crate::error::ShellError;
use crate::orchestrator::ProcessHandle;
use nix::unistd::Pid;
use std::io::{self, Read, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Convert to the interpreter's own convention with
/// [`Status::from_exit_code`](crate::Status::from_exit_code).
pub type ExitCode = i32;

/// Abstraction over a readable input stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// Implementors are the shell's own standard input, a redirection file or the
/// read end of a pipe. A blanket implementation exists for any type that
/// implements `Read` and `Into<Stdio>`.
pub trait Stdin: Read {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Read + Into<Stdio>> Stdin for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// The shell's own standard input. Children inherit it unchanged.
pub struct InheritedStdin(io::Stdin);

impl InheritedStdin {
    pub fn new() -> Self {
        Self(io::stdin())
    }
}

impl Default for InheritedStdin {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Stdin for InheritedStdin {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// Abstraction over a writable output stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any type that implements `Write` and `Into<Stdio>`.
pub trait Stdout: Write {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Write + Into<Stdio>> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Process group placement for a spawned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessGroup {
    /// Stay in the shell's group, so terminal signals reach the child.
    Inherit,
    /// Start a new group led by the child itself.
    Lead,
    /// Join the group led by an earlier member of the same pipeline.
    Join(Pid),
}

/// Object-safe trait for any command that can be started by the shell.
///
/// Built-ins run to completion inside `spawn` and hand back a finished
/// handle; external commands return as soon as the child exists.
pub trait ExecutableCommand {
    fn spawn(
        self: Box<Self>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
        env: &mut Environment,
        group: ProcessGroup,
    ) -> Result<ProcessHandle, ShellError>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
/// Implementations can use the environment to resolve executables (e.g., using PATH).
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;

    /// Name of the built-in this factory makes, if it makes one. Built-ins
    /// run inside the shell process.
    fn builtin_name(&self) -> Option<&'static str> {
        None
    }
}
