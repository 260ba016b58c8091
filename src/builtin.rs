use crate::alias::parse_definition;
use crate::command::{CommandFactory, ExecutableCommand, ExitCode, ProcessGroup, Stdin, Stdout};
use crate::dispatch::Factory;
use crate::env::Environment;
use crate::error::ShellError;
use crate::external::find_command_path;
use crate::jobs::done_line;
use crate::orchestrator::ProcessHandle;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Names and one-line descriptions of the built-ins, as shown by `help`.
pub(crate) const BUILTINS: &[(&str, &str)] = &[
    ("cd", "cd [dir]            change directory (default $HOME)"),
    ("pwd", "pwd                 print the working directory"),
    ("exit", "exit [code]         leave the shell"),
    ("help", "help                show this list"),
    ("history", "history             list previous lines"),
    ("jobs", "jobs                list background and stopped jobs"),
    ("fg", "fg [%id]            continue a job in the foreground"),
    ("bg", "bg [%id]            continue a stopped job in the background"),
    ("kill", "kill <pid|%id>      terminate a process or job"),
    ("export", "export [NAME=value] set a variable, or list all"),
    ("unset", "unset NAME          remove a variable"),
    ("alias", "alias [NAME[=value]] define or show aliases"),
    ("unalias", "unalias NAME        remove an alias"),
    ("echo", "echo [-n] [args]    print arguments"),
    ("type", "type NAME           describe how a name would be run"),
];

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn spawn(
        self: Box<Self>,
        mut stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        env: &mut Environment,
        _group: ProcessGroup,
    ) -> Result<ProcessHandle, ShellError> {
        let code = match T::execute(*self, &mut stdin, &mut stdout, env) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("{}: {e:#}", T::name());
                1
            }
        };
        if let Err(e) = stdout.flush() {
            log::warn!("{}: flushing output failed: {e}", T::name());
        }
        Ok(ProcessHandle::Finished(code))
    }
}

/// Stands in for a built-in whose arguments did not parse, or that was asked
/// for `--help`.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn spawn(
        self: Box<Self>,
        _stdin: Box<dyn Stdin>,
        mut stdout: Box<dyn Stdout>,
        _env: &mut Environment,
        _group: ProcessGroup,
    ) -> Result<ProcessHandle, ShellError> {
        if self.is_error {
            eprintln!("{}", self.output.trim_end());
            return Ok(ProcessHandle::Finished(2));
        }
        if let Err(e) = writeln!(stdout, "{}", self.output.trim_end()) {
            log::warn!("writing help failed: {e}");
        }
        Ok(ProcessHandle::Finished(0))
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }

    fn builtin_name(&self) -> Option<&'static str> {
        Some(T::name())
    }
}

fn is_builtin_name(name: &str) -> bool {
    BUILTINS.iter().any(|(builtin, _)| *builtin == name)
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => anyhow::bail!("no target and HOME not set"),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("can't chdir to {}", canonical.display()))?;
        let previous = std::mem::replace(&mut env.current_dir, canonical);
        env.set_var("OLDPWD", previous.to_string_lossy());
        let pwd = env.current_dir.to_string_lossy().into_owned();
        env.set_var("PWD", pwd);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional)]
    /// exit status of the shell; 0 when omitted.
    pub code: Option<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let code = match self.code.as_deref() {
            None => 0,
            Some(text) => text
                .parse::<ExitCode>()
                .with_context(|| format!("{text}: numeric argument required"))?,
        };
        env.request_exit(code);
        Ok(code)
    }
}

#[derive(FromArgs)]
/// List the shell's built-in commands.
pub struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "Built-in commands:")?;
        for (_, usage) in BUILTINS {
            writeln!(stdout, "  {usage}")?;
        }
        writeln!(
            stdout,
            "Chain commands with `&&`, `||` and `;`, pipe with `|`, redirect with `<`, `>` and `>>`, and end a line with `&` to run it in the background."
        )?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the command history.
pub struct HistoryCmd {}

impl BuiltinCommand for HistoryCmd {
    fn name() -> &'static str {
        "history"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        for (n, line) in env.history.iter().enumerate() {
            writeln!(stdout, "{:>5}  {}", n + 1, line)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List jobs, reporting those that finished since the last check.
pub struct Jobs {}

impl BuiltinCommand for Jobs {
    fn name() -> &'static str {
        "jobs"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        for job in env.jobs.refresh() {
            writeln!(stdout, "{}", done_line(&job))?;
        }
        let current = env.jobs.most_recent();
        for job in env.jobs.iter() {
            let mark = if Some(job.id) == current { '+' } else { ' ' };
            writeln!(
                stdout,
                "[{}]{} {:<8} {}",
                job.id,
                mark,
                job.status(),
                job.command
            )?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Continue a job in the foreground and wait for it.
pub struct Fg {
    #[argh(positional)]
    /// job to continue, as %N or N; the most recent job when omitted.
    pub job: Option<String>,
}

impl BuiltinCommand for Fg {
    fn name() -> &'static str {
        "fg"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let id = env.jobs.resolve(self.job.as_deref())?;
        let status = env.jobs.foreground(id, &env.interrupt, stdout)?;
        Ok(status.exit_code())
    }
}

#[derive(FromArgs)]
/// Continue a stopped job in the background.
pub struct Bg {
    #[argh(positional)]
    /// job to continue, as %N or N; the most recent job when omitted.
    pub job: Option<String>,
}

impl BuiltinCommand for Bg {
    fn name() -> &'static str {
        "bg"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let id = env.jobs.resolve(self.job.as_deref())?;
        env.jobs.background(id, stdout)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Terminate a process or every process of a job with SIGTERM.
pub struct Kill {
    #[argh(positional)]
    /// process id, or %N for job N.
    pub target: String,
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.jobs.kill(&self.target, stdout)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set variables passed to commands, or list them all.
pub struct Export {
    #[argh(positional, greedy)]
    /// assignments of the form NAME=value.
    pub assignments: Vec<String>,
}

impl BuiltinCommand for Export {
    fn name() -> &'static str {
        "export"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.assignments.is_empty() {
            let mut vars: Vec<_> = env.vars.iter().collect();
            vars.sort();
            for (name, value) in vars {
                writeln!(stdout, "{name}={value}")?;
            }
            return Ok(0);
        }
        for assignment in &self.assignments {
            let (name, value) = assignment
                .split_once('=')
                .unwrap_or((assignment.as_str(), ""));
            if !is_valid_identifier(name) {
                anyhow::bail!("`{assignment}`: not a valid identifier");
            }
            if assignment.contains('=') || env.get_var(name).is_none() {
                env.set_var(name, value);
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Remove variables.
pub struct Unset {
    #[argh(positional, greedy)]
    /// names of the variables to remove.
    pub names: Vec<String>,
}

impl BuiltinCommand for Unset {
    fn name() -> &'static str {
        "unset"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        for name in &self.names {
            env.unset_var(name);
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Define an alias, show one, or list them all.
pub struct Alias {
    #[argh(positional, greedy)]
    /// NAME to show, or NAME=value to define.
    pub words: Vec<String>,
}

impl BuiltinCommand for Alias {
    fn name() -> &'static str {
        "alias"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.words.is_empty() {
            for (name, value) in env.aliases.iter() {
                writeln!(stdout, "alias {name}='{value}'")?;
            }
            return Ok(0);
        }

        // The value may have been split on spaces; rejoin it.
        let text = self.words.join(" ");
        if text.contains('=') {
            let (name, value) = parse_definition(&text)
                .with_context(|| format!("`{text}`: invalid alias definition"))?;
            env.aliases.set(name, value);
            return Ok(0);
        }

        let mut code = 0;
        for name in &self.words {
            match env.aliases.get(name) {
                Some(value) => writeln!(stdout, "alias {name}='{value}'")?,
                None => {
                    eprintln!("alias: {name}: not found");
                    code = 1;
                }
            }
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Remove an alias.
pub struct Unalias {
    #[argh(positional)]
    /// alias to remove.
    pub name: String,
}

impl BuiltinCommand for Unalias {
    fn name() -> &'static str {
        "unalias"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.aliases
            .remove(&self.name)
            .with_context(|| format!("{}: not found", self.name))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Describe how each name would be interpreted as a command.
pub struct Type {
    #[argh(positional, greedy)]
    /// command names to look up.
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let mut code = 0;
        for name in &self.names {
            if let Some(value) = env.aliases.get(name) {
                writeln!(stdout, "{name} is aliased to `{value}'")?;
            } else if is_builtin_name(name) {
                writeln!(stdout, "{name} is a shell builtin")?;
            } else if let Some(path) =
                find_command_path(OsStr::new(&search_paths), &env.current_dir, Path::new(name))
            {
                writeln!(stdout, "{name} is {}", path.display())?;
            } else {
                eprintln!("type: {name}: not found");
                code = 1;
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Status;
    use std::env as stdenv;
    use std::io::Cursor;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run<T: BuiltinCommand>(cmd: T, env: &mut Environment) -> (Result<ExitCode>, String) {
        let mut out = Vec::new();
        let res = cmd.execute(&mut Cursor::new(Vec::new()), &mut out, env);
        (res, String::from_utf8(out).unwrap())
    }

    fn empty_env() -> Environment {
        let mut env = Environment::new();
        env.vars.clear();
        env
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let mut env = Environment::in_dir(PathBuf::from("/some/where"));
        let (res, out) = run(Pwd {}, &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "/some/where\n");
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let mut env = empty_env();

        let echo1 = Echo {
            no_newline: false,
            args: vec!["hello".to_string(), "world".to_string()],
        };
        assert_eq!(run(echo1, &mut env).1, "hello world\n");

        let echo2 = Echo {
            no_newline: true,
            args: vec!["foo".to_string(), "bar".to_string()],
        };
        assert_eq!(run(echo2, &mut env).1, "foo bar");
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(temp.path()).expect("canonicalize failed");

        // save original cwd to restore later
        let orig = stdenv::current_dir().unwrap();
        let mut env = Environment::in_dir(orig.clone());

        let target = Some(canonical_temp.to_string_lossy().to_string());
        let (res, _) = run(Cd { target }, &mut env);
        assert!(res.is_ok());

        let new_canonical = fs::canonicalize(stdenv::current_dir().unwrap()).unwrap();
        assert_eq!(new_canonical, canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);
        assert_eq!(
            env.get_var("PWD").as_deref(),
            Some(canonical_temp.to_string_lossy().as_ref())
        );
        assert_eq!(
            env.get_var("OLDPWD").as_deref(),
            Some(orig.to_string_lossy().as_ref())
        );

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(temp.path()).expect("canonicalize failed");

        let orig = stdenv::current_dir().unwrap();
        let mut env = Environment::in_dir(orig.clone());
        env.set_var("HOME", canonical_temp.to_string_lossy().to_string());

        let (res, _) = run(Cd { target: None }, &mut env);
        assert!(res.is_ok());
        assert_eq!(env.current_dir, canonical_temp);

        stdenv::set_current_dir(orig).expect("failed to restore cwd");
    }

    #[test]
    fn test_cd_without_home_errors() {
        let mut env = empty_env();
        let (res, _) = run(Cd { target: None }, &mut env);
        assert!(res.is_err());
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let mut env = Environment::in_dir(orig.clone());

        let name = format!("nonexistent_dir_for_chainsh_test_{}", std::process::id());
        let (res, _) = run(Cd { target: Some(name) }, &mut env);

        assert!(res.is_err());
        assert_eq!(stdenv::current_dir().unwrap(), orig);
        assert_eq!(env.current_dir, orig);
    }

    #[test]
    fn test_exit_requests_stop() {
        let mut env = empty_env();
        let (res, _) = run(Exit { code: Some("7".into()) }, &mut env);
        assert_eq!(res.unwrap(), 7);
        assert!(env.should_exit);
        assert_eq!(env.exit_code, Some(7));

        let mut env = empty_env();
        assert_eq!(run(Exit { code: None }, &mut env).0.unwrap(), 0);
        assert_eq!(env.exit_code, Some(0));
    }

    #[test]
    fn test_exit_rejects_non_numeric_code() {
        let mut env = empty_env();
        let (res, _) = run(Exit { code: Some("soon".into()) }, &mut env);
        assert!(res.is_err());
        assert!(!env.should_exit);
    }

    #[test]
    fn test_help_lists_every_builtin() {
        let mut env = empty_env();
        let (_, out) = run(Help {}, &mut env);
        for (name, _) in BUILTINS {
            assert!(out.contains(&format!("  {name}")), "{name} missing from help");
        }
    }

    #[test]
    fn test_history_is_numbered() {
        let mut env = empty_env();
        env.history.add("ls");
        env.history.add("pwd");
        let (_, out) = run(HistoryCmd {}, &mut env);
        assert_eq!(out, "    1  ls\n    2  pwd\n");
    }

    #[test]
    fn test_export_sets_and_lists() {
        let mut env = empty_env();
        let export = Export {
            assignments: vec!["A=1".into(), "B=two=2".into(), "C".into()],
        };
        assert_eq!(run(export, &mut env).0.unwrap(), 0);
        assert_eq!(env.get_var("A").as_deref(), Some("1"));
        assert_eq!(env.get_var("B").as_deref(), Some("two=2"));
        assert_eq!(env.get_var("C").as_deref(), Some(""));

        let (_, out) = run(Export { assignments: vec![] }, &mut env);
        assert_eq!(out, "A=1\nB=two=2\nC=\n");
    }

    #[test]
    fn test_export_rejects_bad_names() {
        let mut env = empty_env();
        let export = Export {
            assignments: vec!["1X=2".into()],
        };
        assert!(run(export, &mut env).0.is_err());
        assert!(env.vars.is_empty());
    }

    #[test]
    fn test_unset_removes() {
        let mut env = empty_env();
        env.set_var("GONE", "x");
        let (res, _) = run(Unset { names: vec!["GONE".into(), "NEVER".into()] }, &mut env);
        assert!(res.is_ok());
        assert_eq!(env.get_var("GONE"), None);
    }

    #[test]
    fn test_alias_define_show_list() {
        let mut env = empty_env();
        let define = Alias {
            words: vec!["ll='ls".into(), "-l'".into()],
        };
        assert_eq!(run(define, &mut env).0.unwrap(), 0);
        assert_eq!(env.aliases.get("ll"), Some("ls -l"));

        let (_, out) = run(Alias { words: vec!["ll".into()] }, &mut env);
        assert_eq!(out, "alias ll='ls -l'\n");

        let (code, _) = run(Alias { words: vec!["nope".into()] }, &mut env);
        assert_eq!(code.unwrap(), 1);

        let (_, out) = run(Alias { words: vec![] }, &mut env);
        assert_eq!(out, "alias ll='ls -l'\n");
    }

    #[test]
    fn test_unalias() {
        let mut env = empty_env();
        env.aliases.set("g", "git");
        assert!(run(Unalias { name: "g".into() }, &mut env).0.is_ok());
        assert!(run(Unalias { name: "g".into() }, &mut env).0.is_err());
    }

    #[test]
    fn test_type_descriptions() {
        let mut env = Environment::new();
        env.aliases.set("ll", "ls -l");
        let names = vec!["ll".into(), "cd".into(), "sh".into()];
        let (code, out) = run(Type { names }, &mut env);
        assert_eq!(code.unwrap(), 0);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "ll is aliased to `ls -l'");
        assert_eq!(lines[1], "cd is a shell builtin");
        assert!(lines[2].starts_with("sh is /"), "{}", lines[2]);

        let (code, _) = run(Type { names: vec!["no-such-cmd-q".into()] }, &mut env);
        assert_eq!(code.unwrap(), 1);
    }

    #[test]
    fn test_jobs_lists_and_kill_removes() {
        let mut env = empty_env();
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);
        let id = env.jobs.register(&[pid], "sleep 30");

        let (_, out) = run(Jobs {}, &mut env);
        assert_eq!(out, format!("[{id}]+ Running  sleep 30\n"));

        let (res, out) = run(Kill { target: format!("%{id}") }, &mut env);
        assert_eq!(res.unwrap(), 0);
        assert!(out.contains("Terminated"));
        assert!(env.jobs.is_empty());
    }

    #[test]
    fn test_fg_without_jobs_fails() {
        let mut env = empty_env();
        let (res, _) = run(Fg { job: None }, &mut env);
        let err = res.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShellError>(),
            Some(ShellError::NoSuchJob(_))
        ));
        assert!(run(Bg { job: Some("%3".into()) }, &mut env).0.is_err());
    }

    #[test]
    fn test_fg_returns_job_status() {
        let mut env = empty_env();
        let child = std::process::Command::new("false").spawn().unwrap();
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);
        env.jobs.register(&[pid], "false");

        let (res, out) = run(Fg { job: None }, &mut env);
        assert_eq!(Status::from_exit_code(res.unwrap()), Status::Failure(1));
        assert_eq!(out, "[1] false\n");
        assert!(env.jobs.is_empty());
    }

    #[test]
    fn test_factory_reports_bad_arguments() {
        let factory = Factory::<Kill>::default();
        let env = empty_env();
        assert!(factory.try_create(&env, "kill", &[]).is_some());
        assert!(factory.try_create(&env, "echo", &[]).is_none());
        assert_eq!(factory.builtin_name(), Some("kill"));
    }

    #[test]
    fn test_identifiers() {
        assert!(is_valid_identifier("PATH"));
        assert!(is_valid_identifier("_x1"));
        assert!(!is_valid_identifier("1x"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("a-b"));
    }
}
