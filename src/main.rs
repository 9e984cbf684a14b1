use canoni::cli::runner::execute;
use canoni::cli::{Args, Settings};
use canoni::runtime::CliRuntime;
use clap::Parser;
use clap::error::ErrorKind;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    let code = execute(
        &args,
        |key| std::env::var(key).ok(),
        |settings: &Settings| CliRuntime::new(settings.runtime.clone()),
        &mut std::io::stderr(),
    );
    ExitCode::from(code)
}
