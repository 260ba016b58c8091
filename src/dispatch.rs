use crate::command::{CommandFactory, ExecutableCommand};
use crate::env::Environment;
use crate::error::ShellError;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate: built-ins and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Ordered list of command factories queried by name.
///
/// Aliases are applied before the lookup. Built-in factories are skipped when
/// the command is part of a multi-command pipeline.
pub struct CommandRegistry {
    factories: Vec<Box<dyn CommandFactory>>,
}

impl CommandRegistry {
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { factories }
    }

    /// Create the command for `argv` or report that nothing matches.
    pub fn resolve(
        &self,
        env: &Environment,
        argv: &[String],
        allow_builtins: bool,
    ) -> Result<Box<dyn ExecutableCommand>, ShellError> {
        let argv = env.aliases.expand(argv);
        let (name, rest) = argv
            .split_first()
            .ok_or_else(|| ShellError::parse("empty command"))?;
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();

        for factory in &self.factories {
            if !allow_builtins && factory.builtin_name().is_some() {
                continue;
            }
            if let Some(cmd) = factory.try_create(env, name, &args) {
                log::trace!("resolved `{name}`");
                return Ok(cmd);
            }
        }
        Err(ShellError::LaunchFailure(name.clone()))
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.factories
            .iter()
            .any(|f| f.builtin_name() == Some(name))
    }
}

impl Default for CommandRegistry {
    /// Every built-in, then the external command launcher.
    fn default() -> Self {
        use crate::builtin::*;
        use crate::external::ExternalCommand;
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Help>::default()),
            Box::new(Factory::<HistoryCmd>::default()),
            Box::new(Factory::<Jobs>::default()),
            Box::new(Factory::<Fg>::default()),
            Box::new(Factory::<Bg>::default()),
            Box::new(Factory::<Kill>::default()),
            Box::new(Factory::<Export>::default()),
            Box::new(Factory::<Unset>::default()),
            Box::new(Factory::<Alias>::default()),
            Box::new(Factory::<Unalias>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Type>::default()),
            Box::new(Factory::<ExternalCommand>::default()),
        ])
    }
}
