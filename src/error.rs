use thiserror::Error;

/// Failures of the execution engine.
///
/// None of these are fatal: the interpreter reports them on stderr and turns
/// them into a failed [`Status`](crate::Status) at the stage boundary.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("syntax error: {0}")]
    ParseFailure(String),
    #[error("{0}: cannot create process resources: {1}")]
    ResourceExhaustion(&'static str, #[source] std::io::Error),
    #[error("{0}: command not found")]
    LaunchFailure(String),
    #[error("{name}: cannot execute: {source}")]
    ExecFailure {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    RedirectionFailure {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}: {1}")]
    SignalFailure(String, #[source] nix::Error),
    #[error("{0}: job not found")]
    NoSuchJob(String),
}

impl ShellError {
    pub fn parse(msg: impl Into<String>) -> Self {
        ShellError::ParseFailure(msg.into())
    }
}
