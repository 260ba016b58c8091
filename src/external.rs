use crate::command::{
    CommandFactory, ExecutableCommand, ExitCode, ProcessGroup, Stdin, Stdout,
};
use crate::dispatch::Factory;
use crate::env::Environment;
use crate::error::ShellError;
use crate::orchestrator::ProcessHandle;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::{self, ErrorKind};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};

/// Command that is not a builtin.
pub struct ExternalCommand {
    name: String,
    path: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(name: String, path: PathBuf, args: Vec<OsString>) -> Self {
        Self { name, path, args }
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let executable =
            find_command_path(OsStr::new(&search_paths), &env.current_dir, Path::new(name))?;
        Some(Box::new(ExternalCommand::new(
            name.to_string(),
            executable.into_owned(),
            args.iter().map(|x| x.into()).collect(),
        )))
    }
}

impl ExecutableCommand for ExternalCommand {
    fn spawn(
        self: Box<Self>,
        stdin: Box<dyn Stdin>,
        stdout: Box<dyn Stdout>,
        env: &mut Environment,
        group: ProcessGroup,
    ) -> Result<ProcessHandle, ShellError> {
        let mut cmd = std::process::Command::new(&self.path);
        cmd.arg0(&self.name)
            .args(&self.args)
            .stdin(stdin.stdio())
            .stdout(stdout.stdio())
            .env_clear()
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir);
        match group {
            ProcessGroup::Inherit => {}
            ProcessGroup::Lead => {
                cmd.process_group(0);
            }
            ProcessGroup::Join(leader) => {
                cmd.process_group(leader.as_raw());
            }
        }

        let child = cmd.spawn().map_err(|e| launch_error(&self.name, e))?;
        let pid = Pid::from_raw(child.id() as i32);
        log::trace!("spawned `{}` as {} ({:?})", self.name, pid, group);
        // The child is reaped through its pid; dropping the handle neither
        // waits nor kills.
        drop(child);
        Ok(ProcessHandle::Child {
            pid,
            name: self.name,
        })
    }
}

/// Sort a failed spawn into a per-command launch failure or a stage-wide
/// shortage of process resources.
fn launch_error(name: &str, e: io::Error) -> ShellError {
    match e.raw_os_error().map(Errno::from_raw) {
        Some(Errno::EAGAIN | Errno::ENOMEM | Errno::EMFILE | Errno::ENFILE) => {
            ShellError::ResourceExhaustion("fork", e)
        }
        _ if e.kind() == ErrorKind::NotFound => ShellError::LaunchFailure(name.to_string()),
        _ => ShellError::ExecFailure {
            name: name.to_string(),
            source: e,
        },
    }
}

/// Exit code a shell reports for a process killed by `signal`.
pub fn terminated_by_signal(signal: Signal) -> ExitCode {
    128 + signal as i32
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an executable file.
/// - Relative with multiple components (e.g., `bin/sh` or `./foo`): resolved
///   against `cwd`.
/// - Single path component (no separators): search each directory in
///   `search_paths` (PATH) and return the first executable match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup or `cwd`.
pub fn find_command_path<'a>(
    search_paths: &OsStr,
    cwd: &Path,
    path: &'a Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) if !path.starts_with(".") => {
            find_in_path(search_paths, x.as_os_str()).map(Cow::Owned)
        }
        _ => {
            let joined = cwd.join(path);
            find_by_path(&joined).map(|p| Cow::Owned(p.to_path_buf()))
        }
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|path| find_by_path(path).is_some())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    let meta = std::fs::metadata(path).ok()?;
    if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
        Some(path)
    } else {
        None
    }
}
