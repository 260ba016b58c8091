//! Splitting an expanded line into stages joined by `&&`, `||` and `;`, and
//! evaluating them with short-circuit semantics.
//!
//! There is no precedence and no grouping: operators are found by a plain
//! left-to-right scan, so an operator inside quotes still separates stages.

use crate::error::ShellError;
use crate::pipeline::{self, PipelineStage};
use crate::status::Status;

/// The operator that precedes a link in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// First link of a chain.
    None,
    /// `&&`: run only if the previous stage succeeded.
    And,
    /// `||`: run only if the previous stage failed.
    Or,
    /// `;`: always run.
    Sequence,
}

impl Operator {
    fn token(self) -> &'static str {
        match self {
            Operator::None => "",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Sequence => ";",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub operator: Operator,
    pub stage: PipelineStage,
}

/// Stages parsed from one input line.
///
/// Only [`parse_chain`] builds chains, so the first link always carries
/// [`Operator::None`] and no other link does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandChain {
    links: Vec<ChainLink>,
    background: bool,
}

/// Something that can execute one stage for the chain evaluator.
pub trait StageRunner {
    fn run_stage(&mut self, stage: &PipelineStage) -> Status;

    /// Checked after every stage; `true` abandons the rest of the chain.
    fn should_stop(&self) -> bool {
        false
    }
}

impl CommandChain {
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Whether a trailing `&` sent the whole chain to the background.
    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Run the links in order and return the status of the last one run.
    pub fn evaluate(&self, runner: &mut dyn StageRunner) -> Status {
        let mut status = Status::Success;
        for link in &self.links {
            let skip = match link.operator {
                Operator::And => !status.is_success(),
                Operator::Or => status.is_success(),
                Operator::None | Operator::Sequence => false,
            };
            if skip {
                log::debug!(
                    "short-circuit at `{}` before `{}`",
                    link.operator.token(),
                    link.stage.text
                );
                break;
            }
            status = runner.run_stage(&link.stage);
            if runner.should_stop() {
                break;
            }
        }
        status
    }
}

fn next_operator(rest: &[u8]) -> Option<(Operator, usize)> {
    if rest.starts_with(b"&&") {
        Some((Operator::And, 2))
    } else if rest.starts_with(b"||") {
        Some((Operator::Or, 2))
    } else if rest.first() == Some(&b';') {
        Some((Operator::Sequence, 1))
    } else {
        None
    }
}

/// Strip a trailing background `&` (but not the second half of `&&`).
fn split_background(line: &str) -> (&str, bool) {
    let line = line.trim();
    match line.strip_suffix('&') {
        Some(body) if !body.ends_with('&') => (body.trim_end(), true),
        _ => (line, false),
    }
}

/// Parse an already-expanded line.
///
/// Returns `Ok(None)` for a blank line. An empty stage anywhere in the line
/// is a [`ShellError::ParseFailure`].
pub fn parse_chain(line: &str) -> Result<Option<CommandChain>, ShellError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (body, background) = split_background(line);
    if body.is_empty() {
        return Err(ShellError::parse("unexpected `&`"));
    }

    let bytes = body.as_bytes();
    let mut links = Vec::new();
    let mut pending = Operator::None;
    let mut start = 0;
    let mut i = 0;

    let mut push = |operator: Operator,
                    text: &str,
                    next: Option<Operator>|
     -> Result<(), ShellError> {
        if text.trim().is_empty() {
            let near = next.unwrap_or(operator);
            return Err(ShellError::parse(format!(
                "empty command near `{}`",
                near.token()
            )));
        }
        links.push(ChainLink {
            operator,
            stage: pipeline::build_stage(text, background)?,
        });
        Ok(())
    };

    while i < bytes.len() {
        match next_operator(&bytes[i..]) {
            Some((operator, width)) => {
                push(pending, &body[start..i], Some(operator))?;
                pending = operator;
                i += width;
                start = i;
            }
            None => i += 1,
        }
    }
    push(pending, &body[start..], None)?;

    Ok(Some(CommandChain { links, background }))
}
