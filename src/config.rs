use argh::FromArgs;
use std::path::PathBuf;

/// File name of the history kept in the home directory.
pub const HISTORY_FILE_NAME: &str = ".shell_history";

#[derive(FromArgs, Debug)]
/// A small interactive shell with command chains, pipelines and job control.
pub struct ShellArgs {
    #[argh(positional)]
    /// script to run instead of reading commands interactively.
    pub script: Option<PathBuf>,

    #[argh(option)]
    /// where to keep the command history (default: $HOME/.shell_history).
    pub history_file: Option<PathBuf>,

    #[argh(switch)]
    /// neither read nor write a history file.
    pub no_history: bool,
}

impl ShellArgs {
    /// History file to use, given the shell's `HOME`.
    pub fn history_path(&self, home: Option<&str>) -> Option<PathBuf> {
        if self.no_history {
            return None;
        }
        self.history_file
            .clone()
            .or_else(|| home.map(|home| PathBuf::from(home).join(HISTORY_FILE_NAME)))
    }
}
