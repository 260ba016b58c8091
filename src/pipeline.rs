//! Splitting one stage of a chain into piped commands and their redirections.

use crate::error::ShellError;

const PIPE: char = '|';
const WORD_SEPARATORS: &[char] = &[' ', '\t', '\r', '\n', '\x07'];

/// How an output redirection treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Truncate,
    Append,
}

/// Output redirection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: String,
    pub mode: OutputMode,
}

/// A single program invocation inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleCommand {
    /// Program name followed by its arguments. Never empty.
    pub argv: Vec<String>,
    pub input: Option<String>,
    pub output: Option<OutputTarget>,
}

impl SimpleCommand {
    pub fn has_redirection(&self) -> bool {
        self.input.is_some() || self.output.is_some()
    }
}

/// One or more commands connected by pipes, run as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    pub commands: Vec<SimpleCommand>,
    pub background: bool,
    /// Stage text as typed, used when the stage becomes a job.
    pub text: String,
}

/// Split a command text into words. No quoting is recognised.
pub fn split_words(text: &str) -> Vec<String> {
    text.split(WORD_SEPARATORS)
        .filter(|word| !word.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Extract at most one input and one output redirection from an argument list.
///
/// The first `<` and the first `>` or `>>` that are followed by another word
/// consume both words. A repeated operator of the same direction stays an
/// argument, as do the words after a target. An operator at the very end has
/// no target and is left in place as an ordinary argument.
pub fn parse_redirection(words: Vec<String>) -> SimpleCommand {
    let mut command = SimpleCommand::default();
    let mut words = words.into_iter().peekable();

    while let Some(word) = words.next() {
        let free = match word.as_str() {
            "<" => command.input.is_none(),
            ">" | ">>" => command.output.is_none(),
            _ => false,
        };
        if !free || words.peek().is_none() {
            command.argv.push(word);
            continue;
        }
        let Some(target) = words.next() else {
            break;
        };
        match word.as_str() {
            "<" => command.input = Some(target),
            ">" => {
                command.output = Some(OutputTarget {
                    path: target,
                    mode: OutputMode::Truncate,
                })
            }
            _ => {
                command.output = Some(OutputTarget {
                    path: target,
                    mode: OutputMode::Append,
                })
            }
        }
    }
    command
}

/// Build a [`PipelineStage`] from the text between two chain operators.
///
/// In a pipeline of several commands only the first command may redirect its
/// input and only the last may redirect its output.
pub fn build_stage(text: &str, background: bool) -> Result<PipelineStage, ShellError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ShellError::parse("empty command"));
    }

    let parts: Vec<&str> = text.split(PIPE).map(str::trim).collect();
    let last = parts.len() - 1;
    let mut commands = Vec::with_capacity(parts.len());

    for (position, part) in parts.into_iter().enumerate() {
        let words = split_words(part);
        if words.is_empty() {
            return Err(ShellError::parse(format!("empty command near `{PIPE}`")));
        }
        let command = parse_redirection(words);
        if command.argv.is_empty() {
            return Err(ShellError::parse("redirection without a command"));
        }
        if last > 0 {
            if command.input.is_some() && position != 0 {
                return Err(ShellError::parse(format!(
                    "input redirection is only allowed on the first command of a pipeline: `{part}`"
                )));
            }
            if command.output.is_some() && position != last {
                return Err(ShellError::parse(format!(
                    "output redirection is only allowed on the last command of a pipeline: `{part}`"
                )));
            }
        }
        commands.push(command);
    }

    Ok(PipelineStage {
        commands,
        background,
        text: text.to_string(),
    })
}
