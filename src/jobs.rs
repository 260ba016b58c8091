//! Background and stopped pipelines.
//!
//! Job state changes are only observed by polling: [`JobTable::refresh`] runs
//! a non-blocking `waitpid` for every tracked member, and the interpreter
//! calls it before each prompt. Nothing is updated from signal context.

use crate::command::ExitCode;
use crate::error::ShellError;
use crate::orchestrator::classify;
use crate::signals::InterruptFlag;
use crate::status::Status;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::thread;
use std::time::Duration;

pub type JobId = usize;

/// How often `fg` polls its job.
const FOREGROUND_POLL: Duration = Duration::from_millis(20);

/// Exit code of a foreground pipeline suspended with Ctrl-Z.
pub const STOPPED_EXIT: ExitCode = 128 + Signal::SIGTSTP as i32;

/// State of one process, also used as the state of a whole job.
///
/// Ordered so that a job's state is the minimum over its members: any running
/// member keeps the job running and the job is done only when all are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessState {
    Running,
    Stopped,
    Done,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Running => "Running",
            ProcessState::Stopped => "Stopped",
            ProcessState::Done => "Done",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub pid: Pid,
    pub state: ProcessState,
    /// Set once the process has exited.
    pub exit_code: Option<ExitCode>,
}

impl Member {
    pub fn running(pid: Pid) -> Self {
        Self::with_state(pid, ProcessState::Running, None)
    }

    pub fn with_state(pid: Pid, state: ProcessState, exit_code: Option<ExitCode>) -> Self {
        Self {
            pid,
            state,
            exit_code,
        }
    }

    fn is_live(&self) -> bool {
        self.state != ProcessState::Done
    }

    fn apply(&mut self, status: WaitStatus) {
        if let Some((state, exit_code)) = classify(status) {
            self.state = state;
            if exit_code.is_some() {
                self.exit_code = exit_code;
            }
        }
    }

    /// One non-blocking status check.
    fn poll(&mut self) {
        if !self.is_live() {
            return;
        }
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        loop {
            match waitpid(self.pid, Some(flags)) {
                Ok(WaitStatus::StillAlive) => return,
                Ok(status) => return self.apply(status),
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    self.state = ProcessState::Done;
                    return;
                }
                Err(e) => {
                    log::warn!("waitpid({}) failed: {e}", self.pid);
                    self.state = ProcessState::Done;
                    return;
                }
            }
        }
    }
}

/// A pipeline tracked by the shell after control returned to the prompt.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// First member leads the process group.
    pub members: Vec<Member>,
    pub command: String,
}

impl Job {
    pub fn status(&self) -> ProcessState {
        self.members
            .iter()
            .map(|m| m.state)
            .min()
            .unwrap_or(ProcessState::Done)
    }

    pub fn leader(&self) -> Option<Pid> {
        self.members.first().map(|m| m.pid)
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.members.iter().map(|m| m.pid)
    }

    /// Status of the pipeline: the last member's exit code.
    pub fn exit_status(&self) -> Status {
        let code = self
            .members
            .last()
            .and_then(|m| m.exit_code)
            .unwrap_or_default();
        Status::from_exit_code(code)
    }

    fn poll(&mut self) {
        self.members.iter_mut().for_each(Member::poll);
    }

    fn signal_live(&self, sig: Signal) -> Result<(), ShellError> {
        for member in self.members.iter().filter(|m| m.is_live()) {
            match signal::kill(member.pid, sig) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => return Err(ShellError::SignalFailure(format!("%{}", self.id), e)),
            }
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), ShellError> {
        self.signal_live(Signal::SIGCONT)?;
        for member in self.members.iter_mut().filter(|m| m.state == ProcessState::Stopped) {
            member.state = ProcessState::Running;
        }
        Ok(())
    }
}

/// Line printed when a finished job is reclaimed.
pub fn done_line(job: &Job) -> String {
    format!("[{}]+ Done  {}", job.id, job.command)
}

/// The session's jobs, keyed by id in creation order.
#[derive(Debug)]
pub struct JobTable {
    jobs: BTreeMap<JobId, Job>,
    next_id: JobId,
    /// Members of killed jobs, waited for silently so they do not linger as
    /// zombies.
    orphans: Vec<Pid>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: 1,
            orphans: Vec::new(),
        }
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, members: Vec<Member>, command: &str) -> JobId {
        let id = self.next_id;
        self.next_id += 1;
        let job = Job {
            id,
            members,
            command: command.to_string(),
        };
        log::debug!("job [{id}] `{command}` registered as {}", job.status());
        self.jobs.insert(id, job);
        id
    }

    /// Track a freshly started background pipeline.
    pub fn register(&mut self, pids: &[Pid], command: &str) -> JobId {
        self.insert(pids.iter().copied().map(Member::running).collect(), command)
    }

    /// Track a foreground pipeline that was suspended.
    pub fn register_stopped(&mut self, members: Vec<Member>, command: &str) -> JobId {
        self.insert(members, command)
    }

    /// Poll every job, then remove and return those that finished.
    ///
    /// A finished job is returned by exactly one call.
    pub fn refresh(&mut self) -> Vec<Job> {
        self.reap_orphans();
        self.jobs.values_mut().for_each(Job::poll);

        let done: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.status() == ProcessState::Done)
            .map(|job| job.id)
            .collect();
        done.into_iter()
            .filter_map(|id| self.jobs.remove(&id))
            .collect()
    }

    fn reap_orphans(&mut self) {
        self.orphans.retain(|&pid| {
            loop {
                match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                    Ok(WaitStatus::StillAlive) => return true,
                    Err(Errno::EINTR) => continue,
                    _ => return false,
                }
            }
        });
    }

    /// Number of killed processes not yet reaped.
    pub fn pending_reaps(&self) -> usize {
        self.orphans.len()
    }

    pub fn find_by_id(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.jobs.values().find(|job| job.pids().any(|p| p == pid))
    }

    /// Remove a job. Removing an absent id does nothing.
    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        self.jobs.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn most_recent(&self) -> Option<JobId> {
        self.jobs.keys().next_back().copied()
    }

    /// Resolve a job argument: `%N`, `N`, or the most recent job when absent.
    pub fn resolve(&self, arg: Option<&str>) -> Result<JobId, ShellError> {
        let id = match arg {
            None => self.most_recent(),
            Some(arg) => arg
                .strip_prefix('%')
                .unwrap_or(arg)
                .parse::<JobId>()
                .ok()
                .filter(|id| self.jobs.contains_key(id)),
        };
        id.ok_or_else(|| ShellError::NoSuchJob(arg.unwrap_or("current").to_string()))
    }

    /// Continue a job and wait for it in the foreground.
    ///
    /// Interrupts and suspends received by the shell meanwhile are forwarded
    /// to the job's members. A job that finishes is removed; a job that stops
    /// again stays in the table.
    pub fn foreground(
        &mut self,
        id: JobId,
        interrupt: &InterruptFlag,
        out: &mut dyn Write,
    ) -> anyhow::Result<Status> {
        let job = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| ShellError::NoSuchJob(format!("%{id}")))?;
        writeln!(out, "[{}] {}", job.id, job.command)?;
        out.flush()?;
        job.resume()?;

        loop {
            job.poll();
            match job.status() {
                ProcessState::Done => {
                    let status = job.exit_status();
                    self.jobs.remove(&id);
                    return Ok(status);
                }
                ProcessState::Stopped => {
                    writeln!(out, "\n[{}]+ Stopped  {}", job.id, job.command)?;
                    return Ok(Status::Failure(STOPPED_EXIT));
                }
                ProcessState::Running => {}
            }
            if interrupt.take_interrupt() {
                log::debug!("forwarding SIGINT to job [{id}]");
                job.signal_live(Signal::SIGINT)?;
            }
            if interrupt.take_suspend() {
                log::debug!("forwarding SIGTSTP to job [{id}]");
                job.signal_live(Signal::SIGTSTP)?;
            }
            thread::sleep(FOREGROUND_POLL);
        }
    }

    /// Continue a stopped job without waiting for it.
    pub fn background(&mut self, id: JobId, out: &mut dyn Write) -> anyhow::Result<()> {
        let job = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| ShellError::NoSuchJob(format!("%{id}")))?;
        job.resume()?;
        writeln!(out, "[{}] {} &", job.id, job.command)?;
        Ok(())
    }

    /// Send SIGTERM to `%id` (every member of the job) or to a bare pid.
    ///
    /// On success the owning job, if any, is dropped from the table at once;
    /// its processes are reaped by later refreshes.
    pub fn kill(&mut self, target: &str, out: &mut dyn Write) -> anyhow::Result<()> {
        if let Some(number) = target.strip_prefix('%') {
            let id = number
                .parse::<JobId>()
                .ok()
                .filter(|id| self.jobs.contains_key(id))
                .ok_or_else(|| ShellError::NoSuchJob(target.to_string()))?;
            let Some(job) = self.jobs.get(&id) else {
                return Err(ShellError::NoSuchJob(target.to_string()).into());
            };
            job.signal_live(Signal::SIGTERM)?;
            if job.status() == ProcessState::Stopped {
                job.signal_live(Signal::SIGCONT)?;
            }
            if let Some(job) = self.forget(id) {
                writeln!(out, "[{}]+ Terminated  {}", job.id, job.command)?;
            }
            return Ok(());
        }

        let pid = target
            .parse::<i32>()
            .ok()
            .filter(|pid| *pid > 0)
            .map(Pid::from_raw)
            .ok_or_else(|| ShellError::parse(format!("kill: invalid pid `{target}`")))?;
        signal::kill(pid, Signal::SIGTERM)
            .map_err(|e| ShellError::SignalFailure(target.to_string(), e))?;
        let owner = self.find_by_pid(pid).map(|job| job.id);
        if let Some(id) = owner {
            if let Some(job) = self.jobs.get(&id) {
                if job.status() == ProcessState::Stopped {
                    signal::kill(pid, Signal::SIGCONT)
                        .map_err(|e| ShellError::SignalFailure(target.to_string(), e))?;
                }
            }
            self.forget(id);
        }
        writeln!(out, "Process {pid} terminated")?;
        Ok(())
    }

    /// Remove a job and keep its live members for silent reaping.
    fn forget(&mut self, id: JobId) -> Option<Job> {
        let job = self.jobs.remove(&id)?;
        self.orphans
            .extend(job.members.iter().filter(|m| m.is_live()).map(|m| m.pid));
        Some(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Instant;

    fn spawn(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program).args(args).spawn().unwrap();
        Pid::from_raw(child.id() as i32)
    }

    fn refresh_until<F: Fn(&JobTable) -> bool>(table: &mut JobTable, done: F) -> Vec<Job> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut reported = Vec::new();
        while !done(table) {
            assert!(Instant::now() < deadline, "timed out waiting for jobs");
            reported.extend(table.refresh());
            thread::sleep(Duration::from_millis(10));
        }
        reported
    }

    #[test]
    fn ids_increase_and_start_running() {
        let mut table = JobTable::new();
        let a = spawn("sleep", &["5"]);
        let b = spawn("sleep", &["5"]);
        let first = table.register(&[a], "sleep 5");
        let second = table.register(&[b], "sleep 5");
        assert_eq!(first, 1);
        assert!(second > first);
        assert_eq!(table.find_by_id(first).unwrap().status(), ProcessState::Running);

        table.kill("%1", &mut Vec::new()).unwrap();
        table.kill("%2", &mut Vec::new()).unwrap();
        let third = table.register(&[], "true");
        assert_eq!(third, 3, "ids are never reused");
    }

    #[test]
    fn finished_job_is_reported_once() {
        let mut table = JobTable::new();
        let pid = spawn("true", &[]);
        let id = table.register(&[pid], "true");

        let reported = refresh_until(&mut table, |t| t.find_by_id(id).is_none());
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].id, id);
        assert_eq!(done_line(&reported[0]), format!("[{id}]+ Done  true"));
        assert!(table.refresh().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn job_is_done_only_when_all_members_are() {
        let mut table = JobTable::new();
        let quick = spawn("true", &[]);
        let slow = spawn("sleep", &["5"]);
        let id = table.register(&[quick, slow], "true | sleep 5");

        thread::sleep(Duration::from_millis(200));
        assert!(table.refresh().is_empty());
        assert_eq!(table.find_by_id(id).unwrap().status(), ProcessState::Running);
        assert_eq!(table.find_by_pid(slow).map(|j| j.id), Some(id));

        table.kill(&format!("%{id}"), &mut Vec::new()).unwrap();
    }

    #[test]
    fn kill_known_job_removes_it() {
        let mut table = JobTable::new();
        let pid = spawn("sleep", &["30"]);
        let id = table.register(&[pid], "sleep 30");

        let mut out = Vec::new();
        table.kill(&format!("%{id}"), &mut out).unwrap();
        assert!(table.find_by_id(id).is_none());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("[{id}]+ Terminated  sleep 30\n")
        );
        refresh_until(&mut table, |t| t.pending_reaps() == 0);
    }

    #[test]
    fn kill_unknown_job_leaves_table_alone() {
        let mut table = JobTable::new();
        let pid = spawn("sleep", &["30"]);
        let id = table.register(&[pid], "sleep 30");

        let err = table.kill("%99", &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShellError>(),
            Some(ShellError::NoSuchJob(_))
        ));
        assert_eq!(table.len(), 1);

        table.kill(&format!("%{id}"), &mut Vec::new()).unwrap();
    }

    #[test]
    fn kill_by_pid_drops_owning_job() {
        let mut table = JobTable::new();
        let pid = spawn("sleep", &["30"]);
        table.register(&[pid], "sleep 30");

        let mut out = Vec::new();
        table.kill(&pid.to_string(), &mut out).unwrap();
        assert!(table.is_empty());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("Process {pid} terminated\n")
        );
        refresh_until(&mut table, |t| t.pending_reaps() == 0);
    }

    #[test]
    fn kill_rejects_bad_pids() {
        let mut table = JobTable::new();
        for target in ["0", "-1", "abc", ""] {
            assert!(table.kill(target, &mut Vec::new()).is_err(), "{target:?}");
        }
    }

    #[test]
    fn foreground_waits_and_removes() {
        let mut table = JobTable::new();
        let pid = spawn("sh", &["-c", "sleep 0.1; exit 3"]);
        let id = table.register(&[pid], "sh");

        let mut out = Vec::new();
        let status = table
            .foreground(id, &InterruptFlag::new(), &mut out)
            .unwrap();
        assert_eq!(status, Status::Failure(3));
        assert!(table.find_by_id(id).is_none());
        assert_eq!(String::from_utf8(out).unwrap(), format!("[{id}] sh\n"));
    }

    #[test]
    fn foreground_forwards_interrupt() {
        let mut table = JobTable::new();
        let pid = spawn("sleep", &["30"]);
        let id = table.register(&[pid], "sleep 30");

        let flag = InterruptFlag::new();
        flag.raise_interrupt();
        let status = table.foreground(id, &flag, &mut Vec::new()).unwrap();
        assert_eq!(status, Status::Failure(128 + Signal::SIGINT as i32));
    }

    #[test]
    fn stopped_job_resumes_in_background() {
        let mut table = JobTable::new();
        let pid = spawn("sleep", &["30"]);
        let id = table.register(&[pid], "sleep 30");

        signal::kill(pid, Signal::SIGSTOP).unwrap();
        refresh_until(&mut table, |t| {
            t.find_by_id(id).map(Job::status) == Some(ProcessState::Stopped)
        });

        let mut out = Vec::new();
        table.background(id, &mut out).unwrap();
        assert_eq!(table.find_by_id(id).unwrap().status(), ProcessState::Running);
        assert_eq!(String::from_utf8(out).unwrap(), format!("[{id}] sleep 30 &\n"));

        table.kill(&format!("%{id}"), &mut Vec::new()).unwrap();
        refresh_until(&mut table, |t| t.pending_reaps() == 0);
    }

    #[test]
    fn resolve_job_arguments() {
        let mut table = JobTable::new();
        assert!(table.resolve(None).is_err());
        let a = table.register(&[], "a");
        let b = table.register(&[], "b");
        assert_eq!(table.resolve(None).unwrap(), b);
        assert_eq!(table.resolve(Some("%1")).unwrap(), a);
        assert_eq!(table.resolve(Some("2")).unwrap(), b);
        assert!(table.resolve(Some("%7")).is_err());
        assert!(table.resolve(Some("x")).is_err());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut table = JobTable::new();
        let id = table.register(&[], "a");
        assert!(table.remove(id).is_some());
        assert!(table.remove(id).is_none());
        assert!(table.remove(42).is_none());
    }
}
