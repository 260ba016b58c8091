use crate::alias::Aliases;
use crate::command::ExitCode;
use crate::history::History;
use crate::jobs::JobTable;
use crate::signals::InterruptFlag;
use crate::status::Status;
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Prompt suffix used when `PS1` is not set.
pub const DEFAULT_PS1: &str = "$ ";

/// Everything a command can observe or change about the shell session.
///
/// The environment contains:
/// - `vars`: variables exported to executed commands.
/// - `current_dir`: the working directory for command execution.
/// - `should_exit` / `exit_code`: set by `exit`; the interpreter stops once set.
/// - the session registries: aliases, jobs and history.
#[derive(Debug)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that an interactive loop should exit.
    pub should_exit: bool,
    /// Code requested by `exit`, if any.
    pub exit_code: Option<ExitCode>,
    /// Status of the last chain, exposed as `$?`.
    pub last_status: Status,
    pub aliases: Aliases,
    pub jobs: JobTable,
    pub history: History,
    pub interrupt: InterruptFlag,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::in_dir(current_dir)
    }

    /// Like [`Environment::new`], but rooted at `current_dir` instead of the
    /// process's working directory.
    pub fn in_dir(current_dir: PathBuf) -> Self {
        Self {
            vars: stdenv::vars().collect(),
            current_dir,
            should_exit: false,
            exit_code: None,
            last_status: Status::Success,
            aliases: Aliases::default(),
            jobs: JobTable::new(),
            history: History::default(),
            interrupt: InterruptFlag::new(),
        }
    }

    /// Get the value of a variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override a variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn unset_var(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    /// Prompt suffix from `PS1`.
    pub fn ps1(&self) -> String {
        self.get_var("PS1").unwrap_or_else(|| DEFAULT_PS1.to_string())
    }

    /// Ask the interpreter to stop after the current stage.
    pub fn request_exit(&mut self, code: ExitCode) {
        self.should_exit = true;
        self.exit_code = Some(code);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;
    use std::env as stdenv;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::new();
        env.vars.clear();

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");
        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));

        assert_eq!(env.unset_var("KEY"), Some("VALUE".to_string()));
        assert_eq!(env.get_var("KEY"), None);
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_in_dir_keeps_given_directory() {
        let dir = stdenv::temp_dir();
        let env = Environment::in_dir(dir.clone());
        assert_eq!(env.current_dir, dir);
        assert!(env.jobs.is_empty());
    }

    #[test]
    fn test_ps1_default_and_override() {
        let mut env = Environment::new();
        env.unset_var("PS1");
        assert_eq!(env.ps1(), "$ ");
        env.set_var("PS1", "> ");
        assert_eq!(env.ps1(), "> ");
    }

    #[test]
    fn test_request_exit() {
        let mut env = Environment::new();
        assert!(!env.should_exit);
        env.request_exit(3);
        assert!(env.should_exit);
        assert_eq!(env.exit_code, Some(3));
    }
}
