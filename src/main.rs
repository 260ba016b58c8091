use chainsh::{Interpreter, ShellArgs};
use env_logger::Env;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args: ShellArgs = argh::from_env();

    let mut shell = Interpreter::default();
    shell.env().interrupt.install()?;

    let code = match &args.script {
        Some(script) => shell.run_script(script)?,
        None => {
            let home = shell.env().get_var("HOME");
            let history = args.history_path(home.as_deref());
            shell.repl(history.as_deref())?
        }
    };
    std::process::exit(code);
}
