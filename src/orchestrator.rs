//! Turning a parsed stage into running processes.
//!
//! For `n` commands the orchestrator creates `n - 1` close-on-exec pipes,
//! opens redirection files, then spawns the commands in order. Each pipe end
//! is moved into the child that uses it and dropped by the parent right after
//! the spawn, so once the last child is started the parent holds no pipe
//! descriptors and every reader sees end-of-input when its writer exits.

use crate::command::{ExitCode, InheritedStdin, ProcessGroup, Stdin, Stdout};
use crate::dispatch::CommandRegistry;
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::terminated_by_signal;
use crate::jobs::{Member, ProcessState};
use crate::pipeline::{OutputMode, PipelineStage, SimpleCommand};
use crate::status::{CANNOT_EXECUTE, COMMAND_NOT_FOUND, Status};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{Pid, pipe2};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;

/// A started command: either finished in-process or a live child.
#[derive(Debug)]
pub enum ProcessHandle {
    /// Built-in, or a command that could not be launched.
    Finished(ExitCode),
    Child { pid: Pid, name: String },
}

/// Result of a blocking wait on one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(ExitCode),
    Stopped,
}

/// Translate a `waitpid` report into a process state and exit code.
pub fn classify(status: WaitStatus) -> Option<(ProcessState, Option<ExitCode>)> {
    match status {
        WaitStatus::Exited(_, code) => Some((ProcessState::Done, Some(code))),
        WaitStatus::Signaled(_, sig, _) => {
            Some((ProcessState::Done, Some(terminated_by_signal(sig))))
        }
        WaitStatus::Stopped(..) => Some((ProcessState::Stopped, None)),
        WaitStatus::Continued(_) => Some((ProcessState::Running, None)),
        _ => None,
    }
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<Pid> {
        match self {
            ProcessHandle::Finished(_) => None,
            ProcessHandle::Child { pid, .. } => Some(*pid),
        }
    }

    /// Block until the process exits or stops.
    pub fn wait(&self) -> WaitOutcome {
        let (pid, name) = match self {
            ProcessHandle::Finished(code) => return WaitOutcome::Exited(*code),
            ProcessHandle::Child { pid, name } => (*pid, name),
        };
        loop {
            match waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
                Ok(status) => match classify(status) {
                    Some((ProcessState::Done, code)) => {
                        return WaitOutcome::Exited(code.unwrap_or_default());
                    }
                    Some((ProcessState::Stopped, _)) => return WaitOutcome::Stopped,
                    _ => continue,
                },
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    // ECHILD: somebody else reaped it; nothing left to wait for.
                    log::warn!("waitpid({pid}) for `{name}` failed: {e}");
                    return WaitOutcome::Exited(0);
                }
            }
        }
    }
}

/// What happened to a foreground stage.
#[derive(Debug)]
pub enum StageOutcome {
    Completed(Status),
    /// At least one member was stopped; the members are handed over so the
    /// caller can track them as a job.
    Stopped(Vec<Member>),
}

/// Every process of one started stage.
#[derive(Debug)]
pub struct PipelineHandle {
    processes: Vec<ProcessHandle>,
}

impl PipelineHandle {
    /// Pids of the processes that are real children.
    pub fn pids(&self) -> Vec<Pid> {
        self.processes.iter().filter_map(ProcessHandle::pid).collect()
    }

    /// Status of the last command if it has already finished.
    pub fn finished_status(&self) -> Option<Status> {
        match self.processes.last() {
            Some(ProcessHandle::Finished(code)) => Some(Status::from_exit_code(*code)),
            _ => None,
        }
    }

    /// Wait for every process. The stage status is the last command's.
    pub fn wait(self) -> StageOutcome {
        let mut members = Vec::with_capacity(self.processes.len());
        let mut last_code = 0;
        let mut stopped = false;

        for process in &self.processes {
            let outcome = process.wait();
            if let Some(pid) = process.pid() {
                let (state, exit_code) = match outcome {
                    WaitOutcome::Exited(code) => (ProcessState::Done, Some(code)),
                    WaitOutcome::Stopped => (ProcessState::Stopped, None),
                };
                members.push(Member::with_state(pid, state, exit_code));
            }
            match outcome {
                WaitOutcome::Exited(code) => last_code = code,
                WaitOutcome::Stopped => stopped = true,
            }
        }

        if stopped {
            StageOutcome::Stopped(members)
        } else {
            StageOutcome::Completed(Status::from_exit_code(last_code))
        }
    }
}

fn open_input(path: &str) -> Result<File, ShellError> {
    File::open(path).map_err(|source| ShellError::RedirectionFailure {
        path: path.to_string(),
        source,
    })
}

fn open_output(path: &str, mode: OutputMode) -> Result<File, ShellError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o644);
    match mode {
        OutputMode::Truncate => options.truncate(true),
        OutputMode::Append => options.append(true),
    };
    options
        .open(path)
        .map_err(|source| ShellError::RedirectionFailure {
            path: path.to_string(),
            source,
        })
}

fn resolve_path(env: &Environment, path: &str) -> String {
    env.current_dir.join(path).to_string_lossy().into_owned()
}

/// Create the `count - 1` pipes joining `count` commands.
fn create_pipes(count: usize) -> Result<(Vec<Option<File>>, Vec<Option<File>>), ShellError> {
    let mut readers = Vec::with_capacity(count.saturating_sub(1));
    let mut writers = Vec::with_capacity(count.saturating_sub(1));
    for _ in 1..count {
        let (read, write) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| ShellError::ResourceExhaustion("pipe", io::Error::from(e)))?;
        readers.push(Some(File::from(read)));
        writers.push(Some(File::from(write)));
    }
    Ok((readers, writers))
}

/// Start every command of `stage`.
///
/// Redirection and pipe failures abort the stage before anything is spawned.
/// A command that cannot be found or executed is reported and recorded as
/// exit status 127 or 126 without a process; its pipe ends are closed so its
/// neighbours see end-of-input and the rest of the stage still starts. Only
/// running out of process resources stops the stage early. Built-ins are
/// only considered for single-command stages.
pub fn spawn_stage(
    stage: &PipelineStage,
    registry: &CommandRegistry,
    env: &mut Environment,
) -> Result<PipelineHandle, ShellError> {
    let count = stage.commands.len();
    let first = stage.commands.first();
    let last = stage.commands.last();

    let mut input = match first.and_then(|c| c.input.as_deref()) {
        Some(path) => Some(open_input(&resolve_path(env, path))?),
        None => None,
    };
    let mut output = match last.and_then(|c| c.output.as_ref()) {
        Some(target) => Some(open_output(&resolve_path(env, &target.path), target.mode)?),
        None => None,
    };
    let (mut readers, mut writers) = create_pipes(count)?;

    let allow_builtins = count == 1;
    let mut processes: Vec<ProcessHandle> = Vec::with_capacity(count);
    let mut leader: Option<Pid> = None;

    for (k, command) in stage.commands.iter().enumerate() {
        let stdin: Box<dyn Stdin> = match (k, input.take()) {
            (0, Some(file)) => Box::new(file),
            (0, None) => Box::new(InheritedStdin::new()),
            _ => match readers[k - 1].take() {
                Some(file) => Box::new(file),
                None => Box::new(InheritedStdin::new()),
            },
        };
        let stdout: Box<dyn Stdout> = if k + 1 == count {
            match output.take() {
                Some(file) => Box::new(file),
                None => Box::new(io::stdout()),
            }
        } else {
            match writers[k].take() {
                Some(file) => Box::new(file),
                None => Box::new(io::stdout()),
            }
        };
        let group = match (stage.background, leader) {
            (false, _) => ProcessGroup::Inherit,
            (true, None) => ProcessGroup::Lead,
            (true, Some(pid)) => ProcessGroup::Join(pid),
        };

        match start_command(command, registry, env, stdin, stdout, group, allow_builtins) {
            Ok(handle) => {
                if leader.is_none() {
                    leader = handle.pid();
                }
                processes.push(handle);
            }
            Err(e @ ShellError::LaunchFailure(_)) => {
                eprintln!("{e}");
                processes.push(ProcessHandle::Finished(COMMAND_NOT_FOUND));
            }
            Err(e @ ShellError::ExecFailure { .. }) => {
                eprintln!("{e}");
                processes.push(ProcessHandle::Finished(CANNOT_EXECUTE));
            }
            Err(e) => {
                // Out of processes: stop here. Already-started commands lose
                // their pipe partners when the remaining ends drop.
                eprintln!("chainsh: {e}");
                processes.push(ProcessHandle::Finished(CANNOT_EXECUTE));
                break;
            }
        }
    }

    log::debug!(
        "started `{}`: {} command(s), {} process(es)",
        stage.text,
        count,
        processes.iter().filter(|p| p.pid().is_some()).count()
    );
    Ok(PipelineHandle { processes })
}

fn start_command(
    command: &SimpleCommand,
    registry: &CommandRegistry,
    env: &mut Environment,
    stdin: Box<dyn Stdin>,
    stdout: Box<dyn Stdout>,
    group: ProcessGroup,
    allow_builtins: bool,
) -> Result<ProcessHandle, ShellError> {
    let executable = registry.resolve(env, &command.argv, allow_builtins)?;
    executable.spawn(stdin, stdout, env, group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::build_stage;
    use std::fs;

    fn run(line: &str, env: &mut Environment) -> Status {
        let stage = build_stage(line, false).unwrap();
        let registry = CommandRegistry::default();
        let handle = spawn_stage(&stage, &registry, env).unwrap();
        match handle.wait() {
            StageOutcome::Completed(status) => status,
            StageOutcome::Stopped(_) => panic!("unexpected stop"),
        }
    }

    fn scratch_env() -> (tempfile::TempDir, Environment) {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::in_dir(dir.path().to_path_buf());
        (dir, env)
    }

    #[test]
    fn test_pipeline_spawns_one_process_per_command() {
        let (_dir, mut env) = scratch_env();
        let stage = build_stage("true | true | true", false).unwrap();
        let handle = spawn_stage(&stage, &CommandRegistry::default(), &mut env).unwrap();
        assert_eq!(handle.pids().len(), 3);
        assert!(matches!(handle.wait(), StageOutcome::Completed(Status::Success)));
    }

    #[test]
    fn test_status_comes_from_last_command() {
        let (_dir, mut env) = scratch_env();
        assert_eq!(run("false | true", &mut env), Status::Success);
        assert_eq!(run("true | false", &mut env), Status::Failure(1));
    }

    #[test]
    fn test_pipe_delivers_data_and_eof() {
        let (dir, mut env) = scratch_env();
        assert!(run("printf a\\nb\\nc\\n | wc -l > count.txt", &mut env).is_success());
        let text = fs::read_to_string(dir.path().join("count.txt")).unwrap();
        assert_eq!(text.trim(), "3");
    }

    #[test]
    fn test_output_truncate_then_append_then_input() {
        let (dir, mut env) = scratch_env();
        assert!(run("echo hi > t.txt", &mut env).is_success());
        assert_eq!(fs::read_to_string(dir.path().join("t.txt")).unwrap(), "hi\n");
        assert!(run("echo bye >> t.txt", &mut env).is_success());
        assert_eq!(
            fs::read_to_string(dir.path().join("t.txt")).unwrap(),
            "hi\nbye\n"
        );
        assert!(run("cat < t.txt > copy.txt", &mut env).is_success());
        assert_eq!(
            fs::read_to_string(dir.path().join("copy.txt")).unwrap(),
            "hi\nbye\n"
        );
    }

    #[test]
    fn test_missing_input_file_aborts_before_spawn() {
        let (_dir, mut env) = scratch_env();
        let stage = build_stage("cat < missing.txt", false).unwrap();
        let err = spawn_stage(&stage, &CommandRegistry::default(), &mut env).unwrap_err();
        assert!(matches!(err, ShellError::RedirectionFailure { .. }));
    }

    #[test]
    fn test_unknown_command_is_127() {
        let (_dir, mut env) = scratch_env();
        assert_eq!(
            run("definitely-not-a-command-xyz", &mut env),
            Status::Failure(COMMAND_NOT_FOUND)
        );
    }

    #[test]
    fn test_unknown_command_in_pipeline_closes_its_ends() {
        let (_dir, mut env) = scratch_env();
        // `cat` must see end-of-input even though its writer never started.
        assert!(run("definitely-not-a-command-xyz | cat", &mut env).is_success());
    }

    #[test]
    fn test_unexecutable_file_does_not_stop_the_pipeline() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, mut env) = scratch_env();
        let bad = dir.path().join("bad");
        fs::write(&bad, "not a program\n").unwrap();
        fs::set_permissions(&bad, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(run("./bad", &mut env), Status::Failure(CANNOT_EXECUTE));
        assert!(run("./bad | touch second_ran", &mut env).is_success());
        assert!(dir.path().join("second_ran").exists());
    }

    #[test]
    fn test_signaled_process_reports_128_plus_signal() {
        let (dir, mut env) = scratch_env();
        fs::write(dir.path().join("die.sh"), "kill -TERM $$\n").unwrap();
        assert_eq!(run("sh die.sh", &mut env), Status::Failure(143));
    }
}
