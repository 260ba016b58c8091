use crate::chain::{StageRunner, parse_chain};
use crate::command::ExitCode;
use crate::dispatch::CommandRegistry;
use crate::env::Environment;
use crate::expand::expand_line;
use crate::jobs::{STOPPED_EXIT, done_line};
use crate::orchestrator::{StageOutcome, spawn_stage};
use crate::pipeline::{PipelineStage, SimpleCommand};
use crate::status::Status;
use anyhow::Context;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Exit status of a line that failed to parse.
const SYNTAX_ERROR: ExitCode = 2;

/// A shell interpreter that runs command chains against one [`Environment`].
///
/// Commands are created through a [`CommandRegistry`]; see its [`Default`]
/// for the built-ins included out of the box.
///
/// Example
/// ```
/// use chainsh::{Interpreter, Status};
/// let mut sh = Interpreter::default();
/// assert_eq!(sh.run_line("true && echo yes || echo no"), Status::Success);
/// assert_eq!(sh.run_line("false && echo never"), Status::Failure(1));
/// ```
pub struct Interpreter {
    env: Environment,
    registry: CommandRegistry,
}

impl Interpreter {
    /// Create a new interpreter with a custom command registry.
    pub fn new(registry: CommandRegistry) -> Self {
        Self::with_env(Environment::new(), registry)
    }

    pub fn with_env(env: Environment, registry: CommandRegistry) -> Self {
        Self { env, registry }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Run a single command invocation by name with arguments.
    pub fn run(&mut self, name: &str, args: &[&str]) -> Status {
        let argv = std::iter::once(name)
            .chain(args.iter().copied())
            .map(str::to_owned)
            .collect();
        let stage = PipelineStage {
            commands: vec![SimpleCommand {
                argv,
                ..Default::default()
            }],
            background: false,
            text: std::iter::once(name)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" "),
        };
        self.run_foreground(&stage)
    }

    /// Expand, parse and evaluate one input line.
    ///
    /// A blank line is a successful no-op and leaves `$?` alone.
    pub fn run_line(&mut self, line: &str) -> Status {
        let expanded = expand_line(line, &self.env);
        let status = match parse_chain(&expanded) {
            Ok(None) => return Status::Success,
            Ok(Some(chain)) => {
                log::debug!(
                    "chain of {} stage(s){}",
                    chain.links().len(),
                    if chain.is_background() { ", background" } else { "" }
                );
                chain.evaluate(self)
            }
            Err(e) => {
                eprintln!("chainsh: {e}");
                Status::Failure(SYNTAX_ERROR)
            }
        };
        self.env.last_status = status;
        status
    }

    /// Report and forget jobs that finished since the last call.
    pub fn poll_jobs(&mut self, out: &mut dyn Write) -> io::Result<()> {
        for job in self.env.jobs.refresh() {
            writeln!(out, "{}", done_line(&job))?;
        }
        Ok(())
    }

    /// Exit status for the whole session: the code given to `exit`, else 0
    /// when the last chain succeeded and 1 otherwise.
    pub fn exit_code(&self) -> ExitCode {
        self.env
            .exit_code
            .unwrap_or(if self.env.last_status.is_success() { 0 } else { 1 })
    }

    /// Run every line of a script. Blank lines and `#` comments are skipped.
    pub fn run_script(&mut self, path: &Path) -> anyhow::Result<ExitCode> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read script {}", path.display()))?;
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.poll_jobs(&mut io::stdout())?;
            self.run_line(line);
            if self.env.should_exit {
                break;
            }
        }
        self.poll_jobs(&mut io::stdout())?;
        Ok(self.exit_code())
    }

    fn prompt(&self) -> String {
        let user = self.env.get_var("USER").unwrap_or_else(|| "user".to_string());
        let host = nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        let dir = &self.env.current_dir;
        let home = self.env.get_var("HOME").filter(|home| !home.is_empty());
        let cwd = match home.as_deref().map(|home| dir.strip_prefix(home)) {
            Some(Ok(rest)) if rest.as_os_str().is_empty() => "~".to_string(),
            Some(Ok(rest)) => format!("~/{}", rest.display()),
            _ => dir.display().to_string(),
        };
        format!(
            "{}:{}{}",
            format!("{user}@{host}").green().bold(),
            cwd.blue().bold(),
            self.env.ps1()
        )
    }

    /// Interactive read-eval-print loop. Returns the session exit status.
    pub fn repl(&mut self, history_file: Option<&Path>) -> anyhow::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;
        if let Some(path) = history_file {
            if let Err(e) = self.env.history.load(path) {
                log::warn!("cannot load history from {}: {e}", path.display());
            }
            for entry in self.env.history.iter() {
                rl.add_history_entry(entry)?;
            }
        }

        println!("chainsh {} - type `help` for built-in commands", env!("CARGO_PKG_VERSION"));

        while !self.env.should_exit {
            self.poll_jobs(&mut io::stdout())?;
            // Ctrl-C or Ctrl-Z typed at the prompt only redraws it.
            self.env.interrupt.take_interrupt();
            self.env.interrupt.take_suspend();

            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                        self.env.history.add(&line);
                    }
                    self.run_line(&line);
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        if let Some(path) = history_file {
            self.env
                .history
                .save(path)
                .with_context(|| format!("cannot save history to {}", path.display()))?;
        }
        Ok(self.exit_code())
    }

    fn run_foreground(&mut self, stage: &PipelineStage) -> Status {
        let handle = match spawn_stage(stage, &self.registry, &mut self.env) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("chainsh: {e}");
                return Status::failure();
            }
        };
        match handle.wait() {
            StageOutcome::Completed(status) => status,
            StageOutcome::Stopped(members) => {
                let id = self.env.jobs.register_stopped(members, &stage.text);
                println!("\n[{id}]+ Stopped  {}", stage.text);
                self.env.interrupt.take_suspend();
                Status::Failure(STOPPED_EXIT)
            }
        }
    }

    fn run_background(&mut self, stage: &PipelineStage) -> Status {
        let handle = match spawn_stage(stage, &self.registry, &mut self.env) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("chainsh: {e}");
                return Status::failure();
            }
        };
        let pids = handle.pids();
        let Some(leader) = pids.first() else {
            // Nothing outlives the line: a built-in already ran, or the
            // command was not found.
            return handle.finished_status().unwrap_or(Status::Success);
        };
        let id = self.env.jobs.register(&pids, &stage.text);
        println!("[{id}] {leader}");
        Status::Success
    }
}

impl StageRunner for Interpreter {
    fn run_stage(&mut self, stage: &PipelineStage) -> Status {
        if stage.background {
            self.run_background(stage)
        } else {
            self.run_foreground(stage)
        }
    }

    fn should_stop(&self) -> bool {
        self.env.should_exit || self.env.interrupt.take_interrupt()
    }
}

impl Default for Interpreter {
    /// An interpreter with every built-in and the external command launcher.
    fn default() -> Self {
        Self::new(CommandRegistry::default())
    }
}
