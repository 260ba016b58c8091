//! A small Unix shell built around a command-chain execution engine.
//!
//! An input line is expanded, split into stages joined by `&&`, `||` and `;`,
//! and each stage is turned into a pipeline of processes connected by pipes,
//! with optional `<`, `>` and `>>` redirection. A trailing `&` runs the chain
//! in the background, where its pipelines are tracked in a job table that is
//! polled between commands.
//!
//! The main entry point is [`Interpreter`]. The public modules expose the
//! parsers, the orchestrator and the job table for embedding and testing.

pub mod alias;
mod builtin;
pub mod chain;
pub mod command;
pub mod config;
mod dispatch;
pub mod env;
pub mod error;
pub mod expand;
mod external;
pub mod history;
mod interpreter;
pub mod jobs;
pub mod orchestrator;
pub mod pipeline;
pub mod signals;
pub mod status;

pub use chain::{CommandChain, parse_chain};
pub use config::ShellArgs;
pub use dispatch::CommandRegistry;
pub use env::Environment;
pub use error::ShellError;
pub use external::find_command_path;
/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
pub use jobs::{Job, JobId, JobTable, ProcessState};
pub use pipeline::{PipelineStage, SimpleCommand, build_stage};
pub use status::Status;
